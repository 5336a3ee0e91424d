//! Window + event loop.
//!
//! Owns the `winit` event loop on the UI thread. Pointer input goes through
//! the [`InputMapper`](crate::input::InputMapper) and is forwarded to the
//! render thread as commands.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
