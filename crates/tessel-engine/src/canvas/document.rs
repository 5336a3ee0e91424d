use serde::{Deserialize, Serialize};

use crate::coords::{Affine2, ColorRgba, Vec2, Viewport};

use super::LayerId;

/// Fixed canvas dimensions in canvas pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pan/zoom/rotation of the canvas inside the view.
///
/// `offset` is in screen pixels from the view center, `rotation` in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub offset: Vec2,
    pub zoom: f32,
    pub rotation: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            offset: Vec2::zero(),
            zoom: 1.0,
            rotation: 0.0,
        }
    }
}

impl ViewState {
    /// Canvas-to-screen transform relative to the view center:
    /// `translate(offset) · rotate(rotation) · scale(zoom)`.
    pub fn canvas_to_view(&self) -> Affine2 {
        Affine2::translate(self.offset.x, self.offset.y)
            * Affine2::rotate_degrees(self.rotation)
            * Affine2::uniform_scale(self.zoom)
    }

    /// World-to-clip transform for a view of `viewport` size.
    ///
    /// Screen +Y points down while clip +Y points up, hence the flip.
    pub fn world_to_clip(&self, viewport: Viewport) -> Affine2 {
        Affine2::scale(2.0 / viewport.width, -2.0 / viewport.height) * self.canvas_to_view()
    }

    /// Accumulates a navigation delta.
    pub fn navigated(self, pan: Vec2, scale: f32, rotation: f32) -> Self {
        Self {
            offset: self.offset + pan,
            zoom: self.zoom * scale,
            rotation: self.rotation + rotation,
        }
    }
}

/// Starting values for a new canvas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasPreset {
    pub canvas_size: Option<CanvasSize>,
    pub tile_size: u32,
    pub background: ColorRgba,
    pub fps: u32,
}

impl CanvasPreset {
    /// Unbounded canvas with large tiles.
    pub const INFINITE: Self = Self {
        canvas_size: None,
        tile_size: 1024,
        background: ColorRgba::white(),
        fps: 24,
    };

    /// Bounded canvas of the given size.
    pub const fn screen(width: u32, height: u32) -> Self {
        Self {
            canvas_size: Some(CanvasSize::new(width, height)),
            tile_size: 256,
            background: ColorRgba::white(),
            fps: 24,
        }
    }
}

/// Canvas `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CanvasDocument {
    pub canvas_size: Option<CanvasSize>,
    pub tile_size: u32,
    pub fps: u32,
    pub background: ColorRgba,
    pub layers: Vec<LayerId>,
    #[serde(flatten)]
    pub view: ViewState,
    pub current_layer: Option<usize>,
    pub current_frame: i32,
}

impl CanvasDocument {
    pub fn from_preset(preset: &CanvasPreset) -> Self {
        Self {
            canvas_size: preset.canvas_size,
            tile_size: preset.tile_size,
            fps: preset.fps,
            background: preset.background,
            layers: Vec::new(),
            view: ViewState::default(),
            current_layer: None,
            current_frame: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_maps_canvas_origin_to_offset() {
        let view = ViewState {
            offset: Vec2::new(10.0, -5.0),
            zoom: 2.0,
            rotation: 90.0,
        };
        let p = view.canvas_to_view().map_point(Vec2::zero());
        assert_eq!(p, Vec2::new(10.0, -5.0));

        let q = view.canvas_to_view().map_point(Vec2::new(1.0, 0.0));
        assert!((q.x - 10.0).abs() < 1e-4 && (q.y - -3.0).abs() < 1e-4);
    }

    #[test]
    fn default_view_fills_clip_space_with_viewport() {
        let clip = ViewState::default().world_to_clip(Viewport::new(200.0, 100.0));
        let close = |a: Vec2, b: Vec2| (a - b).length() < 1e-5;
        assert!(close(clip.map_point(Vec2::new(100.0, 50.0)), Vec2::new(1.0, -1.0)));
        assert!(close(clip.map_point(Vec2::new(-100.0, -50.0)), Vec2::new(-1.0, 1.0)));
    }

    #[test]
    fn document_json_uses_flat_view_fields() {
        let doc = CanvasDocument::from_preset(&CanvasPreset::screen(512, 512));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["zoom"], 1.0);
        assert_eq!(json["tile_size"], 256);
        assert!(json["current_layer"].is_null());

        let back: CanvasDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
