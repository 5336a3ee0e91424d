//! Tessel engine crate.
//!
//! Tile-based raster canvas: tile stores and the canvas model, the
//! viewport-driven GPU tile cache, brushes, the input mapper, and the
//! render thread and window runtime that tie them together.

pub mod error;

pub mod coords;
pub mod blend;
pub mod store;
pub mod tiling;
pub mod canvas;
pub mod library;

pub mod brush;
pub mod render;
pub mod input;

pub mod device;
pub mod session;
pub mod runtime;
pub mod window;

pub mod logging;
pub mod time;

pub use error::{Error, Result};
