use std::sync::mpsc::Sender;

use winit::dpi::PhysicalSize;

use crate::brush::PenSample;
use crate::coords::{ColorRgba, Vec2};

/// Work item for the render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Resize(PhysicalSize<u32>),
    Navigate { pan: Vec2, scale: f32, rotation: f32 },
    Pen { sample: PenSample, finished: bool },
    SetColor(ColorRgba),
    Redraw,
    /// Finishes any open stroke, persists the view and stops the thread.
    Shutdown,
}

/// Producer side of the render queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RenderQueue {
    sender: Sender<RenderCommand>,
}

impl RenderQueue {
    pub(crate) fn new(sender: Sender<RenderCommand>) -> Self {
        Self { sender }
    }

    /// Enqueues without waiting. Returns false once the render thread is gone.
    pub fn send(&self, command: RenderCommand) -> bool {
        match self.sender.send(command) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("render thread gone, dropped {:?}", e.0);
                false
            }
        }
    }
}
