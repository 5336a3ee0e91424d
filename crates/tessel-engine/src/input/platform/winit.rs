use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, Force, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};

use crate::coords::Vec2;
use crate::input::{PointerEvent, PointerId, PointerPhase, ToolKind};

/// Zoom factor applied per wheel line.
const WHEEL_ZOOM_STEP: f32 = 1.1;
/// Pixel-delta wheels (touchpads) report roughly this many pixels per line.
const PIXELS_PER_LINE: f32 = 40.0;

/// Platform input the runtime cares about.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum WindowInput {
    Pointer(PointerEvent),
    /// Wheel zoom factor about the canvas origin.
    Zoom(f32),
    /// Focus was lost; pointer tracking should be dropped.
    FocusLost,
}

/// Turns winit window events into pointer events in physical pixels.
///
/// winit reports the cursor position and mouse buttons separately, so the
/// translator remembers the last cursor position and the pressed button.
#[derive(Debug, Default, Clone)]
pub struct PointerTranslator {
    cursor: Option<Vec2>,
    pressed: Option<(MouseButton, ToolKind)>,
}

impl PointerTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for events not represented as pointer input.
    pub fn translate(&mut self, event: &WindowEvent) -> Option<WindowInput> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(to_vec2(*position)).map(WindowInput::Pointer)
            }
            WindowEvent::CursorLeft { .. } => self.cursor_left().map(WindowInput::Pointer),
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_input(*button, *state).map(WindowInput::Pointer)
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                wheel_zoom(lines).map(WindowInput::Zoom)
            }
            WindowEvent::Touch(touch) => Some(WindowInput::Pointer(touch_event(
                touch.id,
                touch.phase,
                to_vec2(touch.location),
                touch.force,
            ))),
            WindowEvent::Focused(false) => {
                self.pressed = None;
                Some(WindowInput::FocusLost)
            }
            _ => None,
        }
    }

    pub fn cursor_moved(&mut self, position: Vec2) -> Option<PointerEvent> {
        self.cursor = Some(position);
        let (_, tool) = self.pressed?;
        Some(mouse_event(tool, position, PointerPhase::Move))
    }

    /// Leaving the window while a button is held cancels the drag.
    pub fn cursor_left(&mut self) -> Option<PointerEvent> {
        let (_, tool) = self.pressed.take()?;
        let position = self.cursor.take()?;
        Some(mouse_event(tool, position, PointerPhase::Cancel))
    }

    pub fn mouse_input(&mut self, button: MouseButton, state: ElementState) -> Option<PointerEvent> {
        let position = self.cursor?;
        match state {
            ElementState::Pressed => {
                // One drag at a time; extra buttons are ignored until release.
                if self.pressed.is_some() {
                    return None;
                }
                let tool = mouse_tool(button)?;
                self.pressed = Some((button, tool));
                Some(mouse_event(tool, position, PointerPhase::Down))
            }
            ElementState::Released => {
                let (held, tool) = self.pressed?;
                if held != button {
                    return None;
                }
                self.pressed = None;
                Some(mouse_event(tool, position, PointerPhase::Up))
            }
        }
    }
}

/// Left button draws; right and middle only drag the view.
fn mouse_tool(button: MouseButton) -> Option<ToolKind> {
    match button {
        MouseButton::Left => Some(ToolKind::Mouse),
        MouseButton::Right | MouseButton::Middle => Some(ToolKind::Hand),
        _ => None,
    }
}

fn mouse_event(tool: ToolKind, position: Vec2, phase: PointerPhase) -> PointerEvent {
    PointerEvent::new(PointerId::MOUSE, tool, position, 1.0, phase)
}

/// Touches carrying force data come from a pen; plain touches are fingers.
pub fn touch_event(id: u64, phase: TouchPhase, position: Vec2, force: Option<Force>) -> PointerEvent {
    let phase = match phase {
        TouchPhase::Started => PointerPhase::Down,
        TouchPhase::Moved => PointerPhase::Move,
        TouchPhase::Ended => PointerPhase::Up,
        TouchPhase::Cancelled => PointerPhase::Cancel,
    };

    let (tool, pressure) = match force {
        Some(force) => (ToolKind::Stylus, force.normalized().clamp(0.0, 1.0) as f32),
        None => (ToolKind::Finger, 1.0),
    };

    PointerEvent::new(PointerId(id), tool, position, pressure, phase)
}

/// Zoom factor for a wheel movement of `lines`; `None` when it would be a no-op.
pub fn wheel_zoom(lines: f32) -> Option<f32> {
    if lines == 0.0 || !lines.is_finite() {
        return None;
    }
    Some(WHEEL_ZOOM_STEP.powf(lines))
}

fn to_vec2(p: PhysicalPosition<f64>) -> Vec2 {
    Vec2::new(p.x as f32, p.y as f32)
}
