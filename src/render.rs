//! Frame rendering: batch entities by model, then run the fixed pass
//! sequence picking, shadow, composite (shaded + sky), blit.

use std::iter;

use anyhow::Result;
use wgpu::util::DeviceExt;

use crate::context::Context;
use crate::data_structures::instance::InstanceRaw;
use crate::data_structures::model::{DrawModel, Model};
use crate::entity::{EntityRegistry, ModelId};

struct Batch {
    model: ModelId,
    buffer: wgpu::Buffer,
    count: u32,
}

impl Batch {
    /// Resolve the batch's model and bind its instance buffer at slot 1.
    fn bind<'a>(
        &self,
        registry: &'a EntityRegistry,
        render_pass: &mut wgpu::RenderPass<'_>,
    ) -> Option<&'a Model> {
        let Some(model) = registry.model(self.model) else {
            log::warn!("skipping draw for unregistered model {:?}", self.model);
            return None;
        };
        render_pass.set_vertex_buffer(1, self.buffer.slice(..));
        Some(model)
    }
}

/// Group live entities by model into per-frame instance buffers.
fn build_batches(device: &wgpu::Device, registry: &EntityRegistry) -> Vec<Batch> {
    let mut groups: Vec<(ModelId, Vec<InstanceRaw>)> = Vec::new();
    for record in registry.entities() {
        let raw = InstanceRaw::new(
            record.model_matrix(),
            record.rotation,
            record.id.0,
            record.selected,
        );
        match groups.iter_mut().find(|(model, _)| *model == record.model) {
            Some((_, instances)) => instances.push(raw),
            None => groups.push((record.model, vec![raw])),
        }
    }
    groups
        .into_iter()
        .map(|(model, instances)| Batch {
            model,
            count: instances.len() as u32,
            buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Instance Buffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            }),
        })
        .collect()
}

/// Render one frame. The pass order is fixed; every pass runs even when the
/// scene is empty so the targets are always cleared to a known state.
pub fn render_frame(ctx: &Context, registry: &EntityRegistry) -> Result<(), wgpu::SurfaceError> {
    let output = ctx.surface.get_current_texture()?;
    let surface_view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

    let batches = build_batches(&ctx.device, registry);

    {
        let mut render_pass = ctx.targets.picking.begin_pass(&mut encoder);
        render_pass.set_pipeline(&ctx.pipelines.pick);
        for batch in &batches {
            if let Some(model) = batch.bind(registry, &mut render_pass) {
                render_pass.draw_model_geometry(model, 0..batch.count, &ctx.camera.bind_group);
            }
        }
    }

    {
        let mut render_pass = ctx.targets.shadow.begin_pass(&mut encoder);
        render_pass.set_pipeline(&ctx.pipelines.shadow);
        for batch in &batches {
            if let Some(model) = batch.bind(registry, &mut render_pass) {
                render_pass.draw_model_geometry(model, 0..batch.count, &ctx.light.bind_group);
            }
        }
    }

    {
        let mut render_pass = ctx.targets.scene.begin_pass(&mut encoder, ctx.clear_colour);
        render_pass.set_pipeline(&ctx.pipelines.shaded);
        for batch in &batches {
            if let Some(model) = batch.bind(registry, &mut render_pass) {
                render_pass.draw_model_instanced(
                    model,
                    0..batch.count,
                    &ctx.camera.bind_group,
                    &ctx.light.bind_group,
                    &ctx.targets.shadow.bind_group,
                );
            }
        }
        // The sky fills whatever the depth buffer left untouched.
        render_pass.set_pipeline(&ctx.pipelines.sky);
        render_pass.draw(0..3, 0..1);
    }

    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&ctx.pipelines.blit);
        render_pass.set_bind_group(0, &ctx.targets.scene.blit_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

    ctx.queue.submit(iter::once(encoder.finish()));
    output.present();
    Ok(())
}

/// Read the picking texel at the viewport center and apply the result to the
/// selection. Relies on the picking pass having run this frame.
pub fn pick_at_center(
    async_runtime: &tokio::runtime::Runtime,
    ctx: &Context,
    registry: &mut EntityRegistry,
) -> Result<()> {
    let info = async_runtime.block_on(ctx.targets.picking.read_pixel(
        &ctx.device,
        &ctx.queue,
        ctx.config.width / 2,
        ctx.config.height / 2,
    ))?;
    log::debug!("pick readback: {:?}", info);
    registry.apply_pick(info);
    Ok(())
}
