//! Render-thread state for one open canvas.
//!
//! [`CanvasSession`] ties a [`Canvas`](crate::canvas::Canvas) to its
//! renderer and brush, turns mapper output into renderer calls, and reports
//! finished strokes to the library.

mod canvas_session;

pub use canvas_session::{CanvasSession, StrokeReport};
