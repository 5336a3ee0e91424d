/// Represents a single acquired surface frame.
///
/// Holding the surface texture prevents acquisition of subsequent frames, so
/// submit it promptly.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
