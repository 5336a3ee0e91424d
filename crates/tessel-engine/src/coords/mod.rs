//! Coordinate and geometry types shared by the canvas model, tiling and renderers.
//!
//! Spaces:
//! - Screen: physical pixels, origin top-left, +Y down.
//! - World (canvas): canvas units, origin at the canvas center, +Y down.
//!   One canvas unit is one tile pixel.
//! - Clip: wgpu NDC, +Y up.
//!
//! View transforms are [`Affine2`] values mapping world to clip space.

mod color;
mod rect;
mod transform;
mod vec2;
mod viewport;

pub use color::ColorRgba;
pub use rect::Rect;
pub use transform::Affine2;
pub use vec2::Vec2;
pub use viewport::Viewport;
