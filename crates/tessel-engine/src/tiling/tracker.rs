use std::collections::HashSet;

use crate::coords::{Affine2, Rect, Vec2};
use crate::store::TileAddress;

/// Frame-independent tile coordinate.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TileId {
    pub x: i32,
    pub y: i32,
}

impl TileId {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn address(self, frame: i32) -> TileAddress {
        TileAddress::new(self.x, self.y, frame)
    }

    /// World-space area covered by the tile.
    #[inline]
    pub fn world_rect(self, tile_size: f32) -> Rect {
        Rect::new(
            self.x as f32 * tile_size,
            self.y as f32 * tile_size,
            tile_size,
            tile_size,
        )
    }
}

/// Optional inclusive limits on tile coordinates, per axis and side.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TileBounds {
    pub min_x: Option<i32>,
    pub min_y: Option<i32>,
    pub max_x: Option<i32>,
    pub max_y: Option<i32>,
}

impl TileBounds {
    pub const UNBOUNDED: Self = Self {
        min_x: None,
        min_y: None,
        max_x: None,
        max_y: None,
    };

    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x: Some(min_x),
            min_y: Some(min_y),
            max_x: Some(max_x),
            max_y: Some(max_y),
        }
    }
}

/// Tiles that entered and left the visible set in one update.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TileDelta {
    pub entered: Vec<TileId>,
    pub exited: Vec<TileId>,
}

impl TileDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Upper limit on the visible rectangle. Larger rectangles (extreme zoom-out
/// on an unbounded canvas) are treated as degenerate and ignored.
pub const MAX_VISIBLE_TILES: i64 = 1 << 14;

/// Tracks which tiles intersect the viewport.
#[derive(Debug, Default)]
pub struct TileTracker {
    visible: HashSet<TileId>,
}

impl TileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> &HashSet<TileId> {
        &self.visible
    }

    pub fn is_visible(&self, id: TileId) -> bool {
        self.visible.contains(&id)
    }

    /// Recomputes the visible set from the clip-to-world transform.
    ///
    /// The visible set afterwards is exactly the tile rectangle covering the
    /// world bounds of clip space `[-1, 1]²`, clamped to `bounds`. Non-finite
    /// transforms and oversized rectangles leave the set unchanged.
    pub fn update(
        &mut self,
        clip_to_world: Affine2,
        tile_size: f32,
        bounds: TileBounds,
    ) -> TileDelta {
        let Some((min, max)) = visible_range(clip_to_world, tile_size, bounds) else {
            return TileDelta::default();
        };

        let mut next = HashSet::new();
        for y in min.1..=max.1 {
            for x in min.0..=max.0 {
                next.insert(TileId::new(x, y));
            }
        }

        let delta = TileDelta {
            entered: next.difference(&self.visible).copied().collect(),
            exited: self.visible.difference(&next).copied().collect(),
        };

        if !delta.is_empty() {
            log::trace!(
                "tiles entered: {}, exited: {}, visible: {}",
                delta.entered.len(),
                delta.exited.len(),
                next.len()
            );
        }

        self.visible = next;
        delta
    }

    /// Forgets every visible tile, reporting each as exited.
    pub fn clear(&mut self) -> TileDelta {
        TileDelta {
            entered: Vec::new(),
            exited: self.visible.drain().collect(),
        }
    }
}

type TileCoord = (i32, i32);

fn visible_range(
    clip_to_world: Affine2,
    tile_size: f32,
    bounds: TileBounds,
) -> Option<(TileCoord, TileCoord)> {
    if !(tile_size > 0.0) || !clip_to_world.is_finite() {
        return None;
    }

    let world = clip_to_world.map_rect_bounds(Rect::from_origin_size(
        Vec2::new(-1.0, -1.0),
        Vec2::new(2.0, 2.0),
    ));
    if !world.is_finite() {
        return None;
    }

    let floor_div = |v: f32| (v / tile_size).floor() as i32;
    let lower = |v: i32, bound: Option<i32>| bound.map_or(v, |b| v.max(b));
    let upper = |v: i32, bound: Option<i32>| bound.map_or(v, |b| v.min(b));

    // Intersection with the bounds; may come out empty.
    let min_x = lower(floor_div(world.min().x), bounds.min_x);
    let min_y = lower(floor_div(world.min().y), bounds.min_y);
    let max_x = upper(floor_div(world.max().x), bounds.max_x);
    let max_y = upper(floor_div(world.max().y), bounds.max_y);

    let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1).max(0);
    let count = span(min_x, max_x) * span(min_y, max_y);
    if count > MAX_VISIBLE_TILES {
        log::warn!("viewport covers {count} tiles; skipping tracker update");
        return None;
    }

    Some(((min_x, min_y), (max_x, max_y)))
}
