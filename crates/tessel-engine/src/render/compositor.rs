use std::collections::HashMap;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::blend::Blending;
use crate::coords::{Affine2, ColorRgba, Rect};
use crate::tiling::TileId;

use super::common::{
    create_shader, triangle_list, uniform_layout_entry, QuadVertex, QUAD_INDICES, QUAD_VERTICES,
};
use super::tile_content::TileContent;
use super::{RenderCtx, RenderTarget};

/// One layer's worth of resident tiles, in compositing order.
pub(crate) struct CompositeLayer<'a> {
    pub blending: Blending,
    pub opacity: f32,
    pub tiles: Vec<(TileId, &'a TileContent)>,
}

/// Per-pass parameters.
pub(crate) struct CompositeFrame {
    pub world_to_clip: Affine2,
    pub clear: ColorRgba,
    /// Solid rectangle drawn under the layers (bounded canvas background).
    pub backdrop: Option<(Rect, ColorRgba)>,
    /// World rectangle outside of which tile fragments are discarded.
    pub clip: Option<Rect>,
}

/// Draws tile textures (and the canvas backdrop) into a color target.
///
/// Pipelines are created lazily per `(blending, target format)`. Per-pass
/// buffers are created fresh so passes recorded into different encoders
/// never observe each other's uniforms.
pub(crate) struct TileCompositor {
    tile_size: u32,
    shader: wgpu::ShaderModule,

    frame_layout: wgpu::BindGroupLayout,
    tile_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    fill_pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,

    tile_pipelines: HashMap<(Blending, wgpu::TextureFormat), wgpu::RenderPipeline>,
    fill_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,

    quad_vbo: wgpu::Buffer,
    quad_ibo: wgpu::Buffer,
}

impl TileCompositor {
    pub(crate) fn new(device: &wgpu::Device, tile_size: u32) -> Result<Self> {
        let shader = create_shader(
            device,
            "tessel tile shader",
            include_str!("shaders/tile.wgsl"),
        )?;

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel frame bgl"),
            entries: &[uniform_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let tile_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel tile bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessel tile pipeline layout"),
            bind_group_layouts: &[&frame_layout, &tile_layout],
            immediate_size: 0,
        });

        let fill_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessel fill pipeline layout"),
            bind_group_layouts: &[&frame_layout],
            immediate_size: 0,
        });

        // Bilinear when zoomed out, crisp pixels when zoomed in, no bleeding across seams.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tessel tile sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let quad_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel tile quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel tile quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            tile_size,
            shader,
            frame_layout,
            tile_layout,
            pipeline_layout,
            fill_pipeline_layout,
            sampler,
            tile_pipelines: HashMap::new(),
            fill_pipelines: HashMap::new(),
            quad_vbo,
            quad_ibo,
        })
    }

    pub(crate) fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Allocates a transparent tile bound to this compositor's sampler.
    pub(crate) fn create_tile(&self, device: &wgpu::Device) -> TileContent {
        TileContent::new(device, &self.tile_layout, &self.sampler, self.tile_size)
    }

    /// Clears `target`, then draws the backdrop and every layer bottom to top.
    pub(crate) fn draw(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        frame: &CompositeFrame,
        layers: &[CompositeLayer<'_>],
    ) {
        let format = ctx.target_format;
        self.ensure_fill_pipeline(ctx.device, format);
        for layer in layers {
            self.ensure_tile_pipeline(ctx.device, layer.blending, format);
        }

        let uniform = FrameUniform::new(frame, self.tile_size);
        let frame_ubo = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel frame ubo"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let frame_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessel frame bind group"),
            layout: &self.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_ubo.as_entire_binding(),
            }],
        });

        let ts = self.tile_size as f32;
        let instances: Vec<TileInstance> = layers
            .iter()
            .flat_map(|layer| {
                layer.tiles.iter().map(move |(id, _)| TileInstance {
                    origin: [id.x as f32 * ts, id.y as f32 * ts],
                    opacity: layer.opacity.clamp(0.0, 1.0),
                })
            })
            .collect();

        let tile_vbo = (!instances.is_empty()).then(|| {
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tessel tile instance vbo"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let fill_vbo = frame.backdrop.map(|(rect, color)| {
            let c = color.premultiplied();
            let fill = FillInstance {
                origin: [rect.origin.x, rect.origin.y],
                size: [rect.size.x, rect.size.y],
                color: c.to_array(),
            };
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tessel fill instance vbo"),
                contents: bytemuck::bytes_of(&fill),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tessel composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(frame.clear.to_wgpu()),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_bind_group(0, &frame_bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_vbo.slice(..));
        rpass.set_index_buffer(self.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);

        if let (Some(fill_vbo), Some(pipeline)) = (fill_vbo.as_ref(), self.fill_pipelines.get(&format)) {
            rpass.set_pipeline(pipeline);
            rpass.set_vertex_buffer(1, fill_vbo.slice(..));
            rpass.draw_indexed(0..6, 0, 0..1);
        }

        let Some(tile_vbo) = tile_vbo.as_ref() else { return };
        rpass.set_vertex_buffer(1, tile_vbo.slice(..));

        let mut instance = 0u32;
        for layer in layers {
            let count = layer.tiles.len() as u32;
            let Some(pipeline) = self.tile_pipelines.get(&(layer.blending, format)) else {
                instance += count;
                continue;
            };

            rpass.set_pipeline(pipeline);
            let equation = layer.blending.equation();
            if equation.uses_constant() {
                rpass.set_blend_constant(equation.gpu_constant());
            }

            for (_, content) in &layer.tiles {
                rpass.set_bind_group(1, content.bind_group(), &[]);
                rpass.draw_indexed(0..6, 0, instance..instance + 1);
                instance += 1;
            }
        }
    }

    fn ensure_tile_pipeline(
        &mut self,
        device: &wgpu::Device,
        blending: Blending,
        format: wgpu::TextureFormat,
    ) {
        if self.tile_pipelines.contains_key(&(blending, format)) {
            return;
        }

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tessel tile pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_tile"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), TileInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_tile"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blending.to_wgpu()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: triangle_list(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("created tile pipeline for {blending:?} / {format:?}");
        self.tile_pipelines.insert((blending, format), pipeline);
    }

    fn ensure_fill_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        if self.fill_pipelines.contains_key(&format) {
            return;
        }

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tessel fill pipeline"),
            layout: Some(&self.fill_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_fill"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), FillInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_fill"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(Blending::PremultipliedSourceOver.to_wgpu()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: triangle_list(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.fill_pipelines.insert(format, pipeline);
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FrameUniform {
    world_to_clip: [[f32; 4]; 4],
    clip_rect: [f32; 4],
    params: [f32; 4],
}

impl FrameUniform {
    fn new(frame: &CompositeFrame, tile_size: u32) -> Self {
        let (clip_rect, clip_enabled) = match frame.clip {
            Some(r) => {
                let (min, max) = (r.min(), r.max());
                ([min.x, min.y, max.x, max.y], 1.0)
            }
            None => ([0.0; 4], 0.0),
        };

        Self {
            world_to_clip: frame.world_to_clip.to_mat4_cols(),
            clip_rect,
            params: [tile_size as f32, clip_enabled, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TileInstance {
    origin: [f32; 2],
    opacity: f32,
}

impl TileInstance {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        1 => Float32x2, // origin
        2 => Float32    // opacity
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TileInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FillInstance {
    origin: [f32; 2],
    size: [f32; 2],
    color: [f32; 4],
}

impl FillInstance {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        1 => Float32x2, // origin
        2 => Float32x2, // size
        3 => Float32x4  // color
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<FillInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}
