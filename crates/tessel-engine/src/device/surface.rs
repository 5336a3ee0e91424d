use winit::dpi::PhysicalSize;

/// What the render loop does after failing to acquire a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// The surface was configured again; the next frame may succeed.
    Reconfigured,
    /// Drop this frame and try the next one.
    SkipFrame,
    /// The surface cannot recover; the render thread stops.
    Fatal,
}

impl SurfaceErrorAction {
    #[inline]
    pub fn keeps_rendering(self) -> bool {
        self != SurfaceErrorAction::Fatal
    }
}

/// Lost and outdated surfaces are reconfigured; out-of-memory is fatal.
fn classify(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

/// Picks an sRGB format when asked for one, otherwise a linear one, so tile
/// bytes reach the screen without an extra encode. Falls back to the first
/// supported format.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    caps.formats
        .iter()
        .copied()
        .find(|f| f.is_srgb() == prefer_srgb)
        .or_else(|| caps.formats.first().copied())
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

pub(crate) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    size: &mut PhysicalSize<u32>,
    new_size: PhysicalSize<u32>,
) {
    *size = new_size;
    if new_size.width == 0 || new_size.height == 0 {
        return;
    }

    config.width = new_size.width;
    config.height = new_size.height;
    surface.configure(device, config);
}

pub(crate) fn map_surface_error(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    err: wgpu::SurfaceError,
) -> SurfaceErrorAction {
    let action = classify(&err);
    if action == SurfaceErrorAction::Reconfigured && size.width > 0 && size.height > 0 {
        surface.configure(device, config);
    }
    if action == SurfaceErrorAction::Fatal {
        log::error!("surface error: {err}");
    } else {
        log::debug!("surface error: {err}, {action:?}");
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{CompositeAlphaMode, TextureFormat};

    fn caps(formats: Vec<TextureFormat>, alpha_modes: Vec<CompositeAlphaMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes,
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn linear_format_preferred_unless_srgb_requested() {
        let c = caps(
            vec![TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm],
            vec![],
        );
        assert_eq!(choose_surface_format(&c, false), Some(TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&c, true), Some(TextureFormat::Bgra8UnormSrgb));
    }

    #[test]
    fn format_falls_back_to_first_supported() {
        let c = caps(vec![TextureFormat::Rgba8UnormSrgb], vec![]);
        assert_eq!(choose_surface_format(&c, false), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), false), None);
    }

    #[test]
    fn unsupported_alpha_mode_is_replaced() {
        let c = caps(vec![], vec![CompositeAlphaMode::Opaque]);
        assert_eq!(
            choose_alpha_mode(&c, Some(CompositeAlphaMode::PreMultiplied)),
            CompositeAlphaMode::Opaque
        );
        assert_eq!(choose_alpha_mode(&caps(vec![], vec![]), None), CompositeAlphaMode::Auto);
    }

    #[test]
    fn only_out_of_memory_stops_rendering() {
        use wgpu::SurfaceError;

        assert_eq!(classify(&SurfaceError::Lost), SurfaceErrorAction::Reconfigured);
        assert_eq!(classify(&SurfaceError::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(classify(&SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert!(classify(&SurfaceError::Other).keeps_rendering());
        assert!(!classify(&SurfaceError::OutOfMemory).keeps_rendering());
    }
}
