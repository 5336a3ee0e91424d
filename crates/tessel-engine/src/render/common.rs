//! Shared GPU types and utilities used by the tile compositor and brushes.

use anyhow::{ensure, Result};
use bytemuck::{Pod, Zeroable};

/// Pixel format of every tile texture (straight bytes as persisted by the store).
pub const TILE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// ── quad vertex ───────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub pos: [f32; 2], // 0..1
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

pub(crate) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0] },
    QuadVertex { pos: [0.0, 1.0] },
];

pub(crate) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

// ── shaders ───────────────────────────────────────────────────────────────

/// Creates a WGSL module and fails if the compiler reported any error.
pub(crate) fn create_shader(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
) -> Result<wgpu::ShaderModule> {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let info = pollster::block_on(module.get_compilation_info());
    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| m.message.clone())
        .collect();

    ensure!(errors.is_empty(), "{label} failed to compile: {}", errors.join("; "));
    Ok(module)
}

pub(crate) fn uniform_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn triangle_list() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

// ── readback ──────────────────────────────────────────────────────────────

/// Copies whole `width`×`height` RGBA8 textures back to CPU memory.
///
/// All copies share one submission and one blocking poll. Rows come back
/// tightly packed, top row first.
pub(crate) fn read_textures(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    textures: &[&wgpu::Texture],
    width: u32,
    height: u32,
) -> Result<Vec<Vec<u8>>> {
    use anyhow::Context;

    if textures.is_empty() {
        return Ok(Vec::new());
    }

    let unpadded = width * 4;
    let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("tessel readback encoder"),
    });

    let buffers: Vec<wgpu::Buffer> = textures
        .iter()
        .map(|texture| {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tessel readback buffer"),
                size: u64::from(padded) * u64::from(height),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });

            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded),
                        rows_per_image: None,
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );

            buffer
        })
        .collect();

    queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = std::sync::mpsc::channel();
    for buffer in &buffers {
        let tx = tx.clone();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
    }
    drop(tx);

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .context("failed to wait for texture readback")?;

    let mut mapped = 0;
    for result in rx.try_iter() {
        result.context("failed to map readback buffer")?;
        mapped += 1;
    }
    ensure!(mapped == buffers.len(), "readback finished {mapped} of {} buffers", buffers.len());

    let mut out = Vec::with_capacity(buffers.len());
    for buffer in &buffers {
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = buffer.slice(..).get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        out.push(pixels);
    }

    Ok(out)
}
