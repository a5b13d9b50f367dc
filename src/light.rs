//! Orbiting sun light and its shadow projection.

use cgmath::{Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::camera::OPENGL_TO_WGPU_MATRIX;

/// Near/far planes of the light's orthographic frustum.
const SHADOW_NEAR: f32 = 0.5;
const SHADOW_FAR: f32 = 150.0;
/// Half extent of the orthographic shadow volume around the origin.
const SHADOW_EXTENT: f32 = 60.0;

/// Orbit height and radius of the sun.
const ORBIT_HEIGHT: f32 = 40.0;
const ORBIT_RADIUS: f32 = 50.0;
/// Angular velocity of the orbit in radians per second.
const ORBIT_SPEED: f32 = std::f32::consts::PI / 8.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    view_proj: [[f32; 4]; 4],
    position: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    color: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding2: u32,
}

impl LightUniform {
    fn at(position: Vector3<f32>) -> Self {
        Self {
            view_proj: light_space_matrix(position).into(),
            position: position.into(),
            _padding: 0,
            color: [1.0, 1.0, 1.0],
            _padding2: 0,
        }
    }
}

/// Orthographic light-space matrix looking from `position` at the origin.
fn light_space_matrix(position: Vector3<f32>) -> Matrix4<f32> {
    let projection = cgmath::ortho(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    let view = Matrix4::look_at_rh(
        Point3::new(position.x, position.y, position.z),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
    );
    OPENGL_TO_WGPU_MATRIX * projection * view
}

/// Sun position at `t` seconds into the session.
fn orbit_position(t: f32) -> Vector3<f32> {
    Vector3::new(
        ORBIT_RADIUS * (ORBIT_SPEED * t).sin(),
        ORBIT_HEIGHT,
        ORBIT_RADIUS * (ORBIT_SPEED * t).cos(),
    )
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform = LightUniform::at(orbit_position(0.0));
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("light_bind_group_layout"),
            });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("light_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Advance the orbit and upload the refreshed uniform.
    pub fn update(&mut self, queue: &wgpu::Queue, elapsed_secs: f32) {
        self.uniform = LightUniform::at(orbit_position(elapsed_secs));
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn orbit_keeps_constant_height_and_radius() {
        for t in [0.0, 1.5, 7.0, 42.0] {
            let p = orbit_position(t);
            assert_eq!(p.y, ORBIT_HEIGHT);
            let horizontal = (p.x * p.x + p.z * p.z).sqrt();
            assert!((horizontal - ORBIT_RADIUS).abs() < 1e-3);
        }
    }

    #[test]
    fn light_space_maps_the_origin_inside_clip_space() {
        let m = light_space_matrix(orbit_position(0.0));
        let clip = m * cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.magnitude() < 1.0);
        assert!(ndc.z >= 0.0 && ndc.z <= 1.0);
    }
}
