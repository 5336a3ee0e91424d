use crate::brush::PenSample;
use crate::canvas::ViewState;
use crate::coords::{Vec2, Viewport};

use super::types::{PointerEvent, PointerId, PointerPhase, ToolKind};

/// What the mapper asks the session to do.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MapperAction {
    /// Ask the platform for unbatched, low-latency pointer delivery.
    RequestUncoalesced,
    /// Incremental view change: screen-pixel pan, zoom factor, rotation in degrees.
    Navigate { pan: Vec2, scale: f32, rotation: f32 },
    /// Stroke sample in canvas space; `finished` ends the stroke.
    Paint { sample: PenSample, finished: bool },
}

#[derive(Debug, Copy, Clone)]
struct ActivePointer {
    id: PointerId,
    tool: ToolKind,
    position: Vec2,
    pressure: f32,
}

/// Turns raw pointer events into navigation or painting.
///
/// More than one pointer, a non-pen pointer while touch drawing is off, or
/// a hand drag navigates. Any pen among the active pointers paints instead,
/// cutting the navigation short.
#[derive(Debug, Clone)]
pub struct InputMapper {
    touch_drawing: bool,
    pointers: Vec<ActivePointer>,
    last_touches: Vec<Vec2>,
    stroke: Option<PointerId>,
}

impl InputMapper {
    pub fn new(touch_drawing: bool) -> Self {
        Self {
            touch_drawing,
            pointers: Vec::new(),
            last_touches: Vec::new(),
            stroke: None,
        }
    }

    pub fn touch_drawing(&self) -> bool {
        self.touch_drawing
    }

    pub fn set_touch_drawing(&mut self, touch_drawing: bool) {
        self.touch_drawing = touch_drawing;
    }

    /// Whether a stroke is in progress.
    pub fn is_painting(&self) -> bool {
        self.stroke.is_some()
    }

    /// Forgets all pointers (e.g. on focus loss). An open stroke is finished
    /// at its pointer's last position; the returned actions carry that.
    pub fn reset(&mut self, view: &ViewState, viewport: Viewport) -> Vec<MapperAction> {
        let mut actions = Vec::new();
        self.finish_stroke(view, viewport, &mut actions);
        self.pointers.clear();
        self.last_touches.clear();
        self.stroke = None;
        actions
    }

    /// Feeds one pointer event. `view` and `viewport` are the current view
    /// state and view size, used to map positions into canvas space.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        view: &ViewState,
        viewport: Viewport,
    ) -> Vec<MapperAction> {
        let mut actions = Vec::new();

        if !self.track(event) {
            return actions;
        }

        let pen = self.pointers.iter().find(|p| p.tool.is_pen()).map(|p| p.id);
        let hand = self.pointers.iter().any(|p| p.tool.is_navigation_only());
        let navigate = pen.is_none() && (hand || self.pointers.len() > 1 || !self.touch_drawing);

        if navigate {
            self.finish_stroke(view, viewport, &mut actions);
            self.navigate(event, &mut actions);
        } else {
            self.last_touches.clear();
            let painter = pen.unwrap_or(self.pointers[0].id);
            if self.stroke.is_some_and(|id| id != painter) {
                self.finish_stroke(view, viewport, &mut actions);
            }
            if event.id == painter {
                self.paint(event, view, viewport, &mut actions);
            }
        }

        if event.phase.is_lift() {
            self.pointers.retain(|p| p.id != event.id);
            if self.pointers.is_empty() {
                self.last_touches.clear();
            }
        }

        actions
    }

    /// Updates the active set. Returns false for events about unknown pointers.
    fn track(&mut self, event: PointerEvent) -> bool {
        let existing = self.pointers.iter_mut().find(|p| p.id == event.id);
        match (event.phase, existing) {
            (_, Some(p)) => {
                p.tool = event.tool;
                p.position = event.position;
                p.pressure = event.pressure;
                true
            }
            (PointerPhase::Down, None) => {
                self.pointers.push(ActivePointer {
                    id: event.id,
                    tool: event.tool,
                    position: event.position,
                    pressure: event.pressure,
                });
                true
            }
            (_, None) => false,
        }
    }

    fn navigate(&mut self, event: PointerEvent, actions: &mut Vec<MapperAction>) {
        let lifting = event.phase.is_lift();
        let current: Vec<Vec2> = self
            .pointers
            .iter()
            .filter(|p| !(lifting && p.id == event.id))
            .map(|p| p.position)
            .collect();

        // A different pointer count has no matching previous points to diff against.
        if current.len() == self.last_touches.len() {
            match current.len() {
                1 => actions.push(MapperAction::Navigate {
                    pan: current[0] - self.last_touches[0],
                    scale: 1.0,
                    rotation: 0.0,
                }),
                2 => actions.push(two_finger_delta(
                    [self.last_touches[0], self.last_touches[1]],
                    [current[0], current[1]],
                )),
                _ => {}
            }
        }

        self.last_touches = current;
    }

    fn paint(
        &mut self,
        event: PointerEvent,
        view: &ViewState,
        viewport: Viewport,
        actions: &mut Vec<MapperAction>,
    ) {
        let Some(position) = screen_to_canvas(view, viewport, event.position) else {
            return;
        };
        let sample = PenSample::new(position.x, position.y, event.pressure);

        match event.phase {
            PointerPhase::Down | PointerPhase::Move => {
                if self.stroke.is_none() {
                    actions.push(MapperAction::RequestUncoalesced);
                    self.stroke = Some(event.id);
                }
                actions.push(MapperAction::Paint {
                    sample,
                    finished: false,
                });
            }
            PointerPhase::Up | PointerPhase::Cancel => {
                if self.stroke.take().is_some() {
                    actions.push(MapperAction::Paint {
                        sample,
                        finished: true,
                    });
                }
            }
        }
    }

    /// Ends the open stroke at its pointer's last known position.
    fn finish_stroke(&mut self, view: &ViewState, viewport: Viewport, actions: &mut Vec<MapperAction>) {
        let Some(id) = self.stroke.take() else { return };
        let Some(pointer) = self.pointers.iter().find(|p| p.id == id) else { return };
        let Some(position) = screen_to_canvas(view, viewport, pointer.position) else { return };

        actions.push(MapperAction::Paint {
            sample: PenSample::new(position.x, position.y, pointer.pressure),
            finished: true,
        });
    }
}

impl Default for InputMapper {
    fn default() -> Self {
        Self::new(true)
    }
}

fn two_finger_delta(last: [Vec2; 2], current: [Vec2; 2]) -> MapperAction {
    let last_vec = last[1] - last[0];
    let current_vec = current[1] - current[0];

    let last_len = last_vec.length();
    let scale = if last_len > 0.0 {
        current_vec.length() / last_len
    } else {
        1.0
    };

    let mut rotation = current_vec.angle_degrees() - last_vec.angle_degrees();
    if rotation > 180.0 {
        rotation -= 360.0;
    } else if rotation <= -180.0 {
        rotation += 360.0;
    }

    MapperAction::Navigate {
        pan: current[0].midpoint(current[1]) - last[0].midpoint(last[1]),
        scale,
        rotation,
    }
}

/// Maps a view position to canvas space by undoing pan, zoom and rotation
/// about the view center. `None` when the view is degenerate (zero zoom).
pub fn screen_to_canvas(view: &ViewState, viewport: Viewport, point: Vec2) -> Option<Vec2> {
    let inverse = view.canvas_to_view().invert()?;
    Some(inverse.map_point(point - viewport.center()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport::new(800.0, 600.0);

    fn ev(id: u64, tool: ToolKind, x: f32, y: f32, phase: PointerPhase) -> PointerEvent {
        PointerEvent::new(PointerId(id), tool, Vec2::new(x, y), 1.0, phase)
    }

    fn finger(id: u64, x: f32, y: f32, phase: PointerPhase) -> PointerEvent {
        ev(id, ToolKind::Finger, x, y, phase)
    }

    fn navigations(actions: &[MapperAction]) -> Vec<(Vec2, f32, f32)> {
        actions
            .iter()
            .filter_map(|a| match *a {
                MapperAction::Navigate { pan, scale, rotation } => Some((pan, scale, rotation)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn screen_center_maps_to_canvas_origin() {
        let view = ViewState::default();
        let p = screen_to_canvas(&view, VIEWPORT, Vec2::new(400.0, 300.0)).unwrap();
        assert_eq!(p, Vec2::zero());
    }

    #[test]
    fn screen_to_canvas_undoes_pan_and_zoom() {
        let view = ViewState {
            offset: Vec2::new(100.0, 0.0),
            zoom: 2.0,
            rotation: 0.0,
        };
        let p = screen_to_canvas(&view, VIEWPORT, Vec2::new(520.0, 320.0)).unwrap();
        assert!((p.x - 10.0).abs() < 1e-4 && (p.y - 10.0).abs() < 1e-4, "{p:?}");
    }

    #[test]
    fn screen_to_canvas_undoes_rotation() {
        let view = ViewState {
            offset: Vec2::zero(),
            zoom: 1.0,
            rotation: 90.0,
        };
        // Canvas +X points down on screen after a 90° turn.
        let p = screen_to_canvas(&view, VIEWPORT, Vec2::new(400.0, 310.0)).unwrap();
        assert!((p.x - 10.0).abs() < 1e-4 && p.y.abs() < 1e-4, "{p:?}");
    }

    #[test]
    fn zero_zoom_yields_no_sample() {
        let view = ViewState {
            zoom: 0.0,
            ..ViewState::default()
        };
        let mut mapper = InputMapper::new(true);
        let actions = mapper.handle(finger(1, 10.0, 10.0, PointerPhase::Down), &view, VIEWPORT);
        assert!(actions.is_empty());
    }

    #[test]
    fn spreading_two_fingers_zooms_and_pans_by_midpoint() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);

        assert!(mapper.handle(finger(1, 100.0, 100.0, PointerPhase::Down), &view, VIEWPORT).is_empty());
        assert!(mapper.handle(finger(2, 200.0, 100.0, PointerPhase::Down), &view, VIEWPORT).is_empty());

        let actions = mapper.handle(finger(2, 260.0, 100.0, PointerPhase::Move), &view, VIEWPORT);
        let nav = navigations(&actions);
        assert_eq!(nav.len(), 1);
        let (pan, scale, rotation) = nav[0];
        assert!(scale > 1.0);
        assert!((scale - 1.6).abs() < 1e-5);
        assert_eq!(pan, Vec2::new(30.0, 0.0));
        assert!(rotation.abs() < 1e-4);
    }

    #[test]
    fn twisting_two_fingers_rotates_and_still_zooms() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);
        mapper.handle(finger(1, 0.0, 0.0, PointerPhase::Down), &view, VIEWPORT);
        mapper.handle(finger(2, 100.0, 0.0, PointerPhase::Down), &view, VIEWPORT);

        let actions = mapper.handle(finger(2, 0.0, 200.0, PointerPhase::Move), &view, VIEWPORT);
        let (pan, scale, rotation) = navigations(&actions)[0];
        assert!((scale - 2.0).abs() < 1e-5);
        assert!((rotation - 90.0).abs() < 1e-3);
        assert_eq!(pan, Vec2::new(-50.0, 100.0));
    }

    #[test]
    fn single_finger_pans_when_touch_drawing_is_off() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);
        mapper.handle(finger(1, 10.0, 10.0, PointerPhase::Down), &view, VIEWPORT);

        let actions = mapper.handle(finger(1, 15.0, 30.0, PointerPhase::Move), &view, VIEWPORT);
        assert_eq!(navigations(&actions), vec![(Vec2::new(5.0, 20.0), 1.0, 0.0)]);
    }

    #[test]
    fn pointer_count_change_skips_one_update() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);
        mapper.handle(finger(1, 0.0, 0.0, PointerPhase::Down), &view, VIEWPORT);
        mapper.handle(finger(1, 5.0, 0.0, PointerPhase::Move), &view, VIEWPORT);

        // Second finger lands: nothing to diff against yet.
        let actions = mapper.handle(finger(2, 50.0, 0.0, PointerPhase::Down), &view, VIEWPORT);
        assert!(navigations(&actions).is_empty());

        // Lifting one finger changes the count again.
        let actions = mapper.handle(finger(2, 50.0, 0.0, PointerPhase::Up), &view, VIEWPORT);
        assert!(navigations(&actions).is_empty());

        let actions = mapper.handle(finger(1, 8.0, 0.0, PointerPhase::Move), &view, VIEWPORT);
        assert_eq!(navigations(&actions), vec![(Vec2::new(3.0, 0.0), 1.0, 0.0)]);
    }

    #[test]
    fn stylus_paints_with_uncoalesced_request_and_finish() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);

        let down = mapper.handle(ev(7, ToolKind::Stylus, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        assert_eq!(
            down,
            vec![
                MapperAction::RequestUncoalesced,
                MapperAction::Paint {
                    sample: PenSample::new(0.0, 0.0, 1.0),
                    finished: false
                },
            ]
        );
        assert!(mapper.is_painting());

        let mv = mapper.handle(ev(7, ToolKind::Stylus, 410.0, 300.0, PointerPhase::Move), &view, VIEWPORT);
        assert_eq!(
            mv,
            vec![MapperAction::Paint {
                sample: PenSample::new(10.0, 0.0, 1.0),
                finished: false
            }]
        );

        let up = mapper.handle(ev(7, ToolKind::Stylus, 420.0, 300.0, PointerPhase::Up), &view, VIEWPORT);
        assert_eq!(
            up,
            vec![MapperAction::Paint {
                sample: PenSample::new(20.0, 0.0, 1.0),
                finished: true
            }]
        );
        assert!(!mapper.is_painting());
    }

    #[test]
    fn stylus_among_fingers_forces_paint() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(false);
        mapper.handle(finger(1, 0.0, 0.0, PointerPhase::Down), &view, VIEWPORT);
        mapper.handle(finger(2, 100.0, 0.0, PointerPhase::Down), &view, VIEWPORT);

        let actions = mapper.handle(ev(3, ToolKind::Stylus, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        assert!(navigations(&actions).is_empty());
        assert!(actions.iter().any(|a| matches!(a, MapperAction::Paint { finished: false, .. })));

        // Finger movement while the pen is down neither navigates nor paints.
        let actions = mapper.handle(finger(1, 30.0, 0.0, PointerPhase::Move), &view, VIEWPORT);
        assert!(actions.is_empty());
    }

    #[test]
    fn single_finger_paints_when_touch_drawing_is_on() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        let actions = mapper.handle(finger(1, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        assert!(actions.iter().any(|a| matches!(a, MapperAction::Paint { finished: false, .. })));
    }

    #[test]
    fn second_finger_finishes_touch_stroke_before_navigating() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        mapper.handle(finger(1, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);

        let actions = mapper.handle(finger(2, 500.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        assert_eq!(
            actions,
            vec![MapperAction::Paint {
                sample: PenSample::new(0.0, 0.0, 1.0),
                finished: true
            }]
        );
        assert!(!mapper.is_painting());
    }

    #[test]
    fn cancel_finishes_the_stroke() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        mapper.handle(ev(1, ToolKind::Stylus, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        let actions = mapper.handle(ev(1, ToolKind::Stylus, 400.0, 300.0, PointerPhase::Cancel), &view, VIEWPORT);
        assert!(matches!(actions[..], [MapperAction::Paint { finished: true, .. }]));
    }

    #[test]
    fn moves_of_unknown_pointers_are_ignored() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        assert!(mapper.handle(finger(9, 1.0, 1.0, PointerPhase::Move), &view, VIEWPORT).is_empty());
    }

    #[test]
    fn hand_drag_navigates_with_touch_drawing_on() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        let hand = |x, phase| ev(1, ToolKind::Hand, x, 300.0, phase);

        assert!(mapper.handle(hand(100.0, PointerPhase::Down), &view, VIEWPORT).is_empty());
        let actions = mapper.handle(hand(150.0, PointerPhase::Move), &view, VIEWPORT);
        assert_eq!(actions, vec![MapperAction::Navigate {
            pan: Vec2::new(50.0, 0.0),
            scale: 1.0,
            rotation: 0.0
        }]);
        assert!(!mapper.is_painting());

        let actions = mapper.handle(hand(150.0, PointerPhase::Up), &view, VIEWPORT);
        assert!(actions.is_empty());
    }

    #[test]
    fn reset_finishes_open_stroke_at_last_position() {
        let view = ViewState::default();
        let mut mapper = InputMapper::new(true);
        mapper.handle(ev(1, ToolKind::Stylus, 400.0, 300.0, PointerPhase::Down), &view, VIEWPORT);
        mapper.handle(ev(1, ToolKind::Stylus, 430.0, 300.0, PointerPhase::Move), &view, VIEWPORT);

        let actions = mapper.reset(&view, VIEWPORT);
        assert_eq!(
            actions,
            vec![MapperAction::Paint {
                sample: PenSample::new(30.0, 0.0, 1.0),
                finished: true
            }]
        );
        assert!(!mapper.is_painting());
        assert!(mapper.reset(&view, VIEWPORT).is_empty());

        // The old pointer is forgotten: its moves no longer count.
        let actions = mapper.handle(ev(1, ToolKind::Stylus, 440.0, 300.0, PointerPhase::Move), &view, VIEWPORT);
        assert!(actions.is_empty());
    }
}
