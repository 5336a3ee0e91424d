use crate::coords::Vec2;

/// Platform pointer identifier (touch id, or a fixed id for the mouse).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PointerId(pub u64);

impl PointerId {
    /// Id used for the system mouse, which never collides with touch ids in practice.
    pub const MOUSE: PointerId = PointerId(u64::MAX);
}

/// What is touching the surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ToolKind {
    Finger,
    Stylus,
    Mouse,
    Eraser,
    /// A drag that only ever moves the view (secondary mouse buttons).
    Hand,
}

impl ToolKind {
    /// Pen-like tools always paint, whatever the touch-drawing preference says.
    /// A mouse button press counts as a pen.
    #[inline]
    pub fn is_pen(self) -> bool {
        matches!(self, ToolKind::Stylus | ToolKind::Eraser | ToolKind::Mouse)
    }

    /// Tools that never paint, even alone with touch drawing on.
    #[inline]
    pub fn is_navigation_only(self) -> bool {
        self == ToolKind::Hand
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

impl PointerPhase {
    /// `Up` or `Cancel`: the pointer leaves the active set after this event.
    #[inline]
    pub fn is_lift(self) -> bool {
        matches!(self, PointerPhase::Up | PointerPhase::Cancel)
    }
}

/// One platform pointer update in view (physical pixel) coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointerEvent {
    pub id: PointerId,
    pub tool: ToolKind,
    pub position: Vec2,
    /// Normalized pressure; devices without pressure report 1.
    pub pressure: f32,
    pub phase: PointerPhase,
}

impl PointerEvent {
    pub fn new(id: PointerId, tool: ToolKind, position: Vec2, pressure: f32, phase: PointerPhase) -> Self {
        Self {
            id,
            tool,
            position,
            pressure,
            phase,
        }
    }
}
