//! Viewport tile tracking.
//!
//! Pure geometry: turns a view transform into the set of tile ids the viewport
//! touches and reports what entered or left since the previous update.

mod tracker;

pub use tracker::{TileBounds, TileDelta, TileId, TileTracker, MAX_VISIBLE_TILES};
