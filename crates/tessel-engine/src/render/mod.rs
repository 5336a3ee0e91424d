//! GPU rendering subsystem.
//!
//! [`CanvasRenderer`] is the viewport-driven tile cache: it mirrors visible
//! store tiles into GPU textures, lets brushes draw into them, flushes them
//! back, and composites them over the canvas background.
//!
//! Convention:
//! - World space is canvas pixels, origin at the canvas center, +Y down.
//! - Transforms handed to the renderer map world space to clip space.

pub(crate) mod common;
mod compositor;
mod ctx;
mod renderer;
mod tile_content;

pub use common::TILE_FORMAT;
pub use ctx::{RenderCtx, RenderTarget};
pub use renderer::{thumbnail_size, CanvasRenderer, RendererConfig, TileResidency, TouchedTile};
pub use tile_content::TileContent;
