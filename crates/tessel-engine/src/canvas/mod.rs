//! Canvas and layer model.
//!
//! A [`Canvas`] owns its layers in compositing order (bottom first); each
//! [`Layer`] owns one tile store. The canvas document (`metadata.json`) is the
//! persisted source of truth and is rewritten whenever a field changes.

mod canvas;
mod document;
mod layer;

pub use canvas::Canvas;
pub use document::{CanvasPreset, CanvasSize, ViewState};
pub use layer::{Layer, LayerId, NewLayer};
