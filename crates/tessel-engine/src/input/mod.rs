//! Input subsystem.
//!
//! Pointer types and the mapper are platform-agnostic. The winit translator
//! under `platform` turns window events into [`PointerEvent`]s.

mod mapper;
mod types;

pub mod platform {
    pub mod winit;
}

pub use mapper::{screen_to_canvas, InputMapper, MapperAction};
pub use types::{PointerEvent, PointerId, PointerPhase, ToolKind};
