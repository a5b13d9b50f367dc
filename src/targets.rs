//! Offscreen render targets: scene color, picking buffer, shadow map.
//!
//! Each target owns its attachments and exposes a `begin_pass` that clears
//! and configures a scoped render pass; dropping the pass ends it, so
//! attachment binding and unbinding pair up by construction.
//!
//! The picking buffer doubles as a tiny wire protocol between the GPU and
//! the selection logic: every fragment writes `(object_id, draw_id, prim_id)`
//! as floats, where `draw_id` is one of the sentinels below and a cleared
//! pixel (all zeros) means "nothing here".

use anyhow::{Result, ensure};

use crate::data_structures::texture::Texture;

/// Fragment belongs to a selectable entity.
pub const DRAW_ID_HIT: f32 = 3535.0;
/// Fragment belongs to the entity that is already selected.
pub const DRAW_ID_SELECTED: f32 = 5353.0;

/// Picking attachment format; float channels carry IDs without quantisation.
pub const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Shadow map resolution (square).
pub const SHADOW_MAP_SIZE: u32 = 4096;

/// Decoded contents of one picking texel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelInfo {
    pub object_id: f32,
    pub draw_id: f32,
    pub prim_id: f32,
}

impl PixelInfo {
    pub fn encode(&self) -> [f32; 4] {
        [self.object_id, self.draw_id, self.prim_id, 1.0]
    }

    pub fn decode(texel: [f32; 4]) -> Self {
        Self {
            object_id: texel[0],
            draw_id: texel[1],
            prim_id: texel[2],
        }
    }
}

/// Offscreen color + depth the shaded pass draws into, later composited to
/// the swapchain by the blit pipeline.
pub struct SceneTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: Texture,
    pub blit_bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
}

impl SceneTarget {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        blit_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "scene target must have non-zero dimensions, got {width}x{height}"
        );
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scene color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = Texture::create_depth_texture(device, [width, height], "Scene depth");
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some("Scene blit bind group"),
        });
        Ok(Self {
            color,
            color_view,
            depth,
            blit_bind_group,
            width,
            height,
        })
    }

    pub fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        clear: wgpu::Color,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        })
    }
}

/// Picking attachment plus its readback path.
pub struct PickingTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: Texture,
    pub width: u32,
    pub height: u32,
}

impl PickingTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "picking target must have non-zero dimensions, got {width}x{height}"
        );
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pick texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PICK_FORMAT,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = Texture::create_depth_texture(device, [width, height], "Pick depth");
        Ok(Self {
            color,
            color_view,
            depth,
            width,
            height,
        })
    }

    pub fn begin_pass<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Pick Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        })
    }

    /// Read back a single texel and decode it.
    ///
    /// NOTE: We have to create the mapping THEN `device.poll()` before
    /// awaiting the future. Otherwise the application will freeze.
    pub async fn read_pixel(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        x: u32,
        y: u32,
    ) -> Result<PixelInfo> {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);

        let texel_size = 4 * std::mem::size_of::<f32>() as wgpu::BufferAddress;
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick readback buffer"),
            size: texel_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pick readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    // A single-row copy is exempt from the 256 byte row
                    // alignment requirement.
                    bytes_per_row: None,
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.receive()
            .await
            .ok_or_else(|| anyhow::anyhow!("pick readback channel closed"))??;

        let texel = {
            let data = buffer_slice.get_mapped_range();
            let mut texel = [0.0f32; 4];
            texel.copy_from_slice(bytemuck::cast_slice(&data[..texel_size as usize]));
            texel
        };
        output_buffer.unmap();
        Ok(PixelInfo::decode(texel))
    }
}

/// Bind group layout for sampling the shadow map in the composite pass.
pub fn shadow_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
        label: Some("shadow_bind_group_layout"),
    })
}

/// Depth-only target rendered from the light's point of view.
pub struct ShadowTarget {
    pub depth: Texture,
    pub bind_group: wgpu::BindGroup,
}

impl ShadowTarget {
    pub fn new(device: &wgpu::Device) -> Self {
        let depth = Texture::create_depth_texture(
            device,
            [SHADOW_MAP_SIZE, SHADOW_MAP_SIZE],
            "Shadow map",
        );
        let sampler = depth
            .sampler
            .clone()
            .expect("depth textures always carry a comparison sampler");
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &shadow_layout(device),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some("Shadow bind group"),
        });
        Self { depth, bind_group }
    }

    pub fn begin_pass<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        })
    }
}

/// All offscreen targets owned by the context. Scene and picking track the
/// surface size; the shadow map is fixed.
pub struct Targets {
    pub scene: SceneTarget,
    pub picking: PickingTarget,
    pub shadow: ShadowTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_info_round_trips_through_the_texel_encoding() {
        let info = PixelInfo {
            object_id: 7.0,
            draw_id: DRAW_ID_HIT,
            prim_id: 2.0,
        };
        let decoded = PixelInfo::decode(info.encode());
        assert_eq!(decoded, info);
        assert_eq!(decoded.object_id, 7.0);
        assert_eq!(decoded.draw_id, 3535.0);
        assert_eq!(decoded.prim_id, 2.0);
    }

    #[test]
    fn cleared_texel_decodes_to_no_object() {
        let decoded = PixelInfo::decode([0.0; 4]);
        assert_ne!(decoded.draw_id, DRAW_ID_HIT);
        assert_ne!(decoded.draw_id, DRAW_ID_SELECTED);
    }
}
