//! Brush engine.
//!
//! A brush turns a run of pen samples into pixels of one tile. The renderer
//! calls [`Brush::draw`] once per tile the stroke's bounding box touches, each
//! time with that tile's `board_to_clip` transform, so a brush must produce
//! identical pixels for identical input or strokes show seams at tile edges.

mod round;

pub use round::RoundBrush;

use crate::blend::Blending;
use crate::coords::{Affine2, ColorRgba, Rect, Vec2};
use crate::render::{RenderCtx, RenderTarget};

/// One pen sample in canvas (board) space.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PenSample {
    pub x: f32,
    pub y: f32,
    /// Logical pressure in `[0, 1]`.
    pub pressure: f32,
}

impl PenSample {
    #[inline]
    pub const fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self { x, y, pressure }
    }

    #[inline]
    pub fn position(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn distance_to(self, other: PenSample) -> f32 {
        self.position().distance(other.position())
    }

    /// Linear interpolation of position and pressure.
    #[inline]
    pub fn lerp(self, to: PenSample, t: f32) -> PenSample {
        PenSample {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
            pressure: self.pressure + (to.pressure - self.pressure) * t,
        }
    }
}

/// Resamples a polyline at fixed arc-length `spacing`.
///
/// The first sample is always emitted. Each following segment contributes
/// points at `spacing, 2·spacing, …` strictly before its end point; the end
/// point itself opens the next segment. A non-positive spacing falls back to 1.
pub fn resample(samples: &[PenSample], spacing: f32) -> Vec<PenSample> {
    let spacing = if spacing > 0.0 && spacing.is_finite() { spacing } else { 1.0 };

    let Some((&first, rest)) = samples.split_first() else {
        return Vec::new();
    };

    let mut out = vec![first];
    let mut from = first;

    for &to in rest {
        let distance = from.distance_to(to);
        let mut travelled = spacing;
        while travelled < distance {
            out.push(from.lerp(to, travelled / distance));
            travelled += spacing;
        }
        from = to;
    }

    out
}

/// Union of the sample positions, or `None` for no samples.
pub fn sample_bounds(samples: &[PenSample]) -> Option<Rect> {
    samples
        .iter()
        .map(|s| Rect::from_point(s.position()))
        .reduce(Rect::union)
}

/// Stroke rasterizer.
pub trait Brush: Send {
    /// Area the stroke can touch, used to pick tiles. Implementations inflate
    /// the default by their footprint.
    fn bounding_box(&self, samples: &[PenSample]) -> Option<Rect> {
        sample_bounds(samples)
    }

    /// Records the stroke into `target`, the currently bound tile.
    ///
    /// `board_to_clip` maps canvas space to the target's clip space. `color`
    /// is straight alpha.
    fn draw(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        samples: &[PenSample],
        board_to_clip: Affine2,
        color: ColorRgba,
        blending: Blending,
    );
}

/// Transform that maps tile `(tx, ty)`'s world square onto the full clip
/// square, with texture row 0 at the tile's top edge.
pub fn tile_board_to_clip(tile_size: f32, tx: i32, ty: i32) -> Affine2 {
    Affine2::translate(-1.0, 1.0)
        * Affine2::scale(2.0 / tile_size, -2.0 / tile_size)
        * Affine2::translate(-tile_size * tx as f32, -tile_size * ty as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(x: f32, y: f32) -> PenSample {
        PenSample::new(x, y, 1.0)
    }

    #[test]
    fn resample_single_sample_emits_it() {
        assert_eq!(resample(&[s(3.0, 4.0)], 1.0), vec![s(3.0, 4.0)]);
        assert!(resample(&[], 1.0).is_empty());
    }

    #[test]
    fn resample_spaces_points_and_excludes_segment_end() {
        let out = resample(&[s(0.0, 0.0), s(4.0, 0.0)], 1.0);
        let xs: Vec<f32> = out.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn resample_interpolates_pressure() {
        let out = resample(&[PenSample::new(0.0, 0.0, 0.0), PenSample::new(2.0, 0.0, 1.0)], 1.0);
        assert_eq!(out.len(), 2);
        assert!((out[1].pressure - 0.5).abs() < 1e-6);
    }

    #[test]
    fn resample_is_deterministic() {
        let input = [s(0.5, 0.25), s(10.0, 7.0), s(-3.0, 2.0)];
        assert_eq!(resample(&input, 1.0), resample(&input, 1.0));
    }

    #[test]
    fn bounds_cover_all_samples() {
        let r = sample_bounds(&[s(1.0, 5.0), s(-2.0, 3.0)]).unwrap();
        assert_eq!(r, Rect::new(-2.0, 3.0, 3.0, 2.0));
        assert!(sample_bounds(&[]).is_none());
    }

    #[test]
    fn board_to_clip_maps_tile_corners() {
        let m = tile_board_to_clip(256.0, 1, -1);
        assert_eq!(m.map_point(Vec2::new(256.0, -256.0)), Vec2::new(-1.0, 1.0));
        assert_eq!(m.map_point(Vec2::new(512.0, 0.0)), Vec2::new(1.0, -1.0));
    }
}
