use std::collections::HashMap;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::blend::Blending;
use crate::coords::{Affine2, ColorRgba, Rect};
use crate::render::common::{
    create_shader, triangle_list, uniform_layout_entry, QuadVertex, QUAD_INDICES, QUAD_VERTICES,
};
use crate::render::{RenderCtx, RenderTarget};

use super::{resample, sample_bounds, Brush, PenSample};

/// Pressure-sized round stamps laid along the stroke.
///
/// Each resampled point becomes one instanced quad of diameter
/// `pressure² × max_size`, cut to a disc in the fragment stage.
pub struct RoundBrush {
    max_size: f32,
    spacing: f32,

    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<(Blending, wgpu::TextureFormat), wgpu::RenderPipeline>,

    stroke_ubo: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    quad_vbo: wgpu::Buffer,
    quad_ibo: wgpu::Buffer,

    instance_vbo: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl RoundBrush {
    pub const DEFAULT_MAX_SIZE: f32 = 50.0;
    pub const DEFAULT_SPACING: f32 = 1.0;

    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let shader = create_shader(
            device,
            "tessel round brush shader",
            include_str!("shaders/round.wgsl"),
        )?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel round brush bgl"),
            entries: &[uniform_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessel round brush pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let stroke_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessel round brush ubo"),
            size: std::mem::size_of::<StrokeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessel round brush bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: stroke_ubo.as_entire_binding(),
            }],
        });

        let quad_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel round brush quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel round brush quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            max_size: Self::DEFAULT_MAX_SIZE,
            spacing: Self::DEFAULT_SPACING,
            shader,
            pipeline_layout,
            pipelines: HashMap::new(),
            stroke_ubo,
            bind_group,
            quad_vbo,
            quad_ibo,
            instance_vbo: None,
            instance_capacity: 0,
        })
    }

    pub fn with_max_size(mut self, max_size: f32) -> Self {
        self.max_size = max_size.max(0.0);
        self
    }

    pub fn max_size(&self) -> f32 {
        self.max_size
    }

    /// Stamps for `samples`: `(center, diameter)` after resampling.
    fn stamps(&self, samples: &[PenSample]) -> Vec<StampInstance> {
        resample(samples, self.spacing)
            .into_iter()
            .map(|s| StampInstance {
                center: [s.x, s.y],
                size: s.pressure.clamp(0.0, 1.0).powi(2) * self.max_size,
            })
            .filter(|stamp| stamp.size > 0.0)
            .collect()
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, blending: Blending, format: wgpu::TextureFormat) {
        if self.pipelines.contains_key(&(blending, format)) {
            return;
        }

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tessel round brush pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), StampInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
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

        self.pipelines.insert((blending, format), pipeline);
    }

    fn ensure_instance_capacity(&mut self, device: &wgpu::Device, required: usize) {
        if required <= self.instance_capacity && self.instance_vbo.is_some() {
            return;
        }

        let new_cap = required.next_power_of_two().max(64);
        self.instance_vbo = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessel round brush instance vbo"),
            size: (new_cap * std::mem::size_of::<StampInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = new_cap;
    }
}

impl Brush for RoundBrush {
    fn bounding_box(&self, samples: &[PenSample]) -> Option<Rect> {
        sample_bounds(samples).map(|r| r.inflate(self.max_size))
    }

    fn draw(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        samples: &[PenSample],
        board_to_clip: Affine2,
        color: ColorRgba,
        blending: Blending,
    ) {
        let stamps = self.stamps(samples);
        if stamps.is_empty() {
            return;
        }

        self.ensure_pipeline(ctx.device, blending, ctx.target_format);
        self.ensure_instance_capacity(ctx.device, stamps.len());

        let Some(instance_vbo) = self.instance_vbo.as_ref() else { return };
        let Some(pipeline) = self.pipelines.get(&(blending, ctx.target_format)) else { return };

        let uniform = StrokeUniform {
            board_to_clip: board_to_clip.to_mat4_cols(),
            color: color.to_array(),
        };
        ctx.queue.write_buffer(&self.stroke_ubo, 0, bytemuck::bytes_of(&uniform));
        ctx.queue.write_buffer(instance_vbo, 0, bytemuck::cast_slice(&stamps));

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tessel round brush pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_vbo.slice(..));
        rpass.set_vertex_buffer(1, instance_vbo.slice(..));
        rpass.set_index_buffer(self.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);

        let equation = blending.equation();
        if equation.uses_constant() {
            rpass.set_blend_constant(equation.gpu_constant());
        }

        rpass.draw_indexed(0..6, 0, 0..stamps.len() as u32);
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct StrokeUniform {
    board_to_clip: [[f32; 4]; 4],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct StampInstance {
    center: [f32; 2],
    size: f32,
}

impl StampInstance {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        1 => Float32x2, // center
        2 => Float32    // size
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<StampInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}
