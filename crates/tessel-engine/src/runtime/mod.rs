//! Render thread and its command queue.
//!
//! The window thread only produces [`RenderCommand`]s; the render thread owns
//! the [`Gpu`](crate::device::Gpu) and the [`CanvasSession`](crate::session::CanvasSession)
//! and executes commands strictly in arrival order.

mod command;
mod thread;

pub use command::{RenderCommand, RenderQueue};
pub use thread::{RenderThread, SessionSource};
