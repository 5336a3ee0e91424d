use serde::{Deserialize, Serialize};

/// Key of one stored tile: tile coordinates plus animation frame.
///
/// Tile `(x, y)` covers canvas units `[x * tile_size, (x + 1) * tile_size)` on
/// each axis.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct TileAddress {
    pub x: i32,
    pub y: i32,
    pub frame: i32,
}

impl TileAddress {
    #[inline]
    pub const fn new(x: i32, y: i32, frame: i32) -> Self {
        Self { x, y, frame }
    }
}
