//! Event loop, input handling, and the per-frame step/sync/prune/render
//! sequence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use cgmath::{One, Quaternion, Rad, Rotation3, Vector2, Vector3, Zero};
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use crate::{
    context::Context,
    entity::{EntityRegistry, ModelId},
    physics::PhysicsWorld,
    render,
    resources::primitives,
};

/// Launch speed of flung objects, along the camera's view direction.
const FLING_SPEED: f32 = 200.0;
/// Objects appear this far in front of the camera.
const SPAWN_OFFSET: f32 = 4.0;

/// Minimum delay between consecutive flings while the buttons are mashed.
const FLING_INTERVAL: Duration = Duration::from_millis(150);

const BALL_RADIUS: f32 = 1.0;
const CUBE_HALF_EXTENTS: Vector3<f32> = Vector3::new(1.0, 1.0, 1.0);
const DONUT_RADIUS: f32 = 1.0;
const GROUND_DIMENSIONS: Vector2<f32> = Vector2::new(20.0, 20.0);

struct SceneModels {
    ground: ModelId,
    ball: ModelId,
    cube: ModelId,
    donut: ModelId,
}

/// Rate limiter for spawning; the first shot always fires.
struct FlingCadence {
    last: Option<Instant>,
}

impl FlingCadence {
    fn new() -> Self {
        Self { last: None }
    }

    fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now - last < FLING_INTERVAL {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

struct Sandbox {
    ctx: Context,
    physics: PhysicsWorld,
    registry: EntityRegistry,
    models: SceneModels,
    cadence: FlingCadence,
    started: Instant,
    last_frame: Instant,
    ctrl_held: bool,
    shift_held: bool,
}

impl Sandbox {
    fn new(ctx: Context) -> Result<Self> {
        let mut registry = EntityRegistry::new();
        let mut physics = PhysicsWorld::new();

        let models = SceneModels {
            ground: registry.create_model(primitives::ground_model(&ctx.device, &ctx.queue)?),
            ball: registry.create_model(primitives::ball_model(&ctx.device, &ctx.queue)?),
            cube: registry.create_model(primitives::cube_model(&ctx.device, &ctx.queue)?),
            donut: registry.create_model(primitives::donut_model(&ctx.device, &ctx.queue)?),
        };
        registry.spawn_ground(
            &mut physics,
            models.ground,
            Vector3::zero(),
            GROUND_DIMENSIONS,
            Quaternion::one(),
        );

        let now = Instant::now();
        Ok(Self {
            ctx,
            physics,
            registry,
            models,
            cadence: FlingCadence::new(),
            started: now,
            last_frame: now,
            ctrl_held: false,
            shift_held: false,
        })
    }

    /// One frame: step, sync, prune, then render. The order is fixed.
    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = now - self.last_frame;
        self.last_frame = now;

        self.physics.step(dt.as_secs_f32());
        self.physics.sync_transforms(&mut self.registry);
        self.registry.prune(&mut self.physics);

        let camera = &mut self.ctx.camera;
        camera.controller.update_camera(&mut camera.camera, dt);
        camera.uniform.update_view_proj(&camera.camera, &self.ctx.projection);
        self.ctx
            .queue
            .write_buffer(&camera.buffer, 0, bytemuck::cast_slice(&[camera.uniform]));
        self.ctx
            .light
            .update(&self.ctx.queue, self.started.elapsed().as_secs_f32());

        match render::render_frame(&self.ctx, &self.registry) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.ctx.window.inner_size();
                if let Err(e) = self.ctx.resize(size.width, size.height) {
                    log::error!("failed to rebuild the surface: {e:#}");
                }
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of GPU memory, shutting down");
                event_loop.exit();
            }
            Err(e) => log::warn!("dropped a frame: {e:?}"),
        }
    }

    fn spawn_point(&self) -> Vector3<f32> {
        let camera = &self.ctx.camera.camera;
        camera.position.to_homogeneous().truncate() + camera.forward() * SPAWN_OFFSET
    }

    /// A gentle toss drops the object in place; otherwise it launches along
    /// the view direction.
    fn fling_velocity(&self) -> Vector3<f32> {
        if self.shift_held {
            Vector3::zero()
        } else {
            self.ctx.camera.camera.forward() * FLING_SPEED
        }
    }

    fn fling_ball(&mut self) {
        if !self.cadence.ready(Instant::now()) {
            return;
        }
        let position = self.spawn_point();
        let velocity = self.fling_velocity();
        self.registry.spawn_ball(
            &mut self.physics,
            self.models.ball,
            position,
            velocity,
            BALL_RADIUS,
        );
    }

    fn fling_cube(&mut self) {
        if !self.cadence.ready(Instant::now()) {
            return;
        }
        let position = self.spawn_point();
        let velocity = self.fling_velocity();
        // Cubes leave the hand facing the camera's heading.
        let rotation = Quaternion::from_angle_y(Rad(-self.ctx.camera.camera.yaw.0));
        self.registry.spawn_cube(
            &mut self.physics,
            self.models.cube,
            position,
            CUBE_HALF_EXTENTS,
            velocity,
            rotation,
        );
    }

    fn fling_donut(&mut self) {
        if !self.cadence.ready(Instant::now()) {
            return;
        }
        let position = self.spawn_point();
        let velocity = self.fling_velocity();
        if let Err(e) = self.registry.spawn_donut(
            &mut self.physics,
            self.models.donut,
            position,
            velocity,
            DONUT_RADIUS,
        ) {
            log::error!("failed to spawn a donut: {e:#}");
        }
    }

    fn pick(&mut self, async_runtime: &tokio::runtime::Runtime) {
        if let Err(e) = render::pick_at_center(async_runtime, &self.ctx, &mut self.registry) {
            log::error!("picking failed: {e:#}");
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.registry.release_all(&mut self.physics);
        event_loop.exit();
    }
}

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    state: Option<Sandbox>,
    init_error: Option<anyhow::Error>,
}

impl App {
    fn new() -> Result<Self> {
        Ok(Self {
            async_runtime: tokio::runtime::Builder::new_multi_thread()
                .build()
                .context("failed to start the async runtime")?,
            state: None,
            init_error: None,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("flingbox");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.init_error = Some(e.into());
                event_loop.exit();
                return;
            }
        };
        // Mouse-look wants a captured cursor; picking happens at the screen
        // center, so the cursor itself is never needed.
        if window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
            .is_ok()
        {
            window.set_cursor_visible(false);
        }

        let sandbox = self
            .async_runtime
            .block_on(Context::new(window))
            .and_then(Sandbox::new);
        match sandbox {
            Ok(sandbox) => {
                sandbox.ctx.window.request_redraw();
                self.state = Some(sandbox);
            }
            Err(e) => {
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if window_id != state.ctx.window.id() {
            return;
        }
        if state.ctx.camera.controller.handle_window_events(&event) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => state.shutdown(event_loop),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => state.shutdown(event_loop),
                KeyCode::KeyT => state.fling_donut(),
                _ => {}
            },
            WindowEvent::ModifiersChanged(modifiers) => {
                state.ctrl_held = modifiers.state().control_key();
                state.shift_held = modifiers.state().shift_key();
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button,
                ..
            } => match button {
                MouseButton::Left if state.ctrl_held => state.pick(&self.async_runtime),
                MouseButton::Left => state.fling_ball(),
                MouseButton::Right => state.fling_cube(),
                _ => {}
            },
            WindowEvent::Resized(size) => {
                if let Err(e) = state.ctx.resize(size.width, size.height) {
                    log::error!("resize failed: {e:#}");
                }
            }
            WindowEvent::RedrawRequested => {
                state.frame(event_loop);
                state.ctx.window.request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        if let (Some(state), DeviceEvent::MouseMotion { delta }) = (self.state.as_mut(), event) {
            state
                .ctx
                .camera
                .controller
                .process_mouse(delta.0, delta.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fling_always_fires() {
        let mut cadence = FlingCadence::new();
        assert!(cadence.ready(Instant::now()));
    }

    #[test]
    fn flings_inside_the_interval_are_swallowed() {
        let mut cadence = FlingCadence::new();
        let start = Instant::now();
        assert!(cadence.ready(start));
        assert!(!cadence.ready(start + FLING_INTERVAL / 2));
        assert!(cadence.ready(start + FLING_INTERVAL * 2));
    }
}

/// Initialise logging, build the app, and drive the event loop to completion.
pub fn run() -> Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Failed to initialise the logger: {e}");
    }
    let event_loop = EventLoop::new()?;
    let mut app = App::new()?;
    event_loop.run_app(&mut app)?;
    match app.init_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
