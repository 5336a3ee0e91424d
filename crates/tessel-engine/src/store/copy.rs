use image::RgbaImage;

use crate::error::Result;

use super::{TileAddress, TileStore};

/// Integer rectangle in canvas pixels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Copies the canvas region `src` of `frame` into `dst` at `dst_origin`.
///
/// Only tiles present in `store` are read. Destination pixels covered by
/// absent tiles keep their previous bytes. The region is clipped to `dst`.
pub fn copy_pixels(
    store: &dyn TileStore,
    frame: i32,
    src: PixelRect,
    dst: &mut RgbaImage,
    dst_origin: (u32, u32),
) -> Result<()> {
    let (dst_x, dst_y) = dst_origin;
    let width = src.width.min(dst.width().saturating_sub(dst_x)) as i64;
    let height = src.height.min(dst.height().saturating_sub(dst_y)) as i64;
    if width == 0 || height == 0 {
        return Ok(());
    }

    let ts = store.tile_size() as i64;
    let (x0, y0) = (src.x as i64, src.y as i64);
    let (x1, y1) = (x0 + width, y0 + height);
    let dst_stride = dst.width() as usize * 4;
    let dst_bytes: &mut [u8] = dst;
    let mut scratch = vec![0u8; store.bytes_per_tile()];

    for ty in tile_span(y0, y1, ts) {
        for tx in tile_span(x0, x1, ts) {
            let address = TileAddress::new(tx as i32, ty as i32, frame);
            if !store.is_tile_present(address) || !store.load_tile(address, &mut scratch)? {
                continue;
            }

            // Overlap of this tile with the source region, in canvas pixels.
            let ox0 = x0.max(tx * ts);
            let ox1 = x1.min((tx + 1) * ts);
            let oy0 = y0.max(ty * ts);
            let oy1 = y1.min((ty + 1) * ts);
            let row_bytes = ((ox1 - ox0) * 4) as usize;

            for y in oy0..oy1 {
                let src_off = (((y - ty * ts) * ts + (ox0 - tx * ts)) * 4) as usize;
                let dst_row = (dst_y as i64 + (y - y0)) as usize;
                let dst_col = (dst_x as i64 + (ox0 - x0)) as usize;
                let dst_off = dst_row * dst_stride + dst_col * 4;
                dst_bytes[dst_off..dst_off + row_bytes]
                    .copy_from_slice(&scratch[src_off..src_off + row_bytes]);
            }
        }
    }

    Ok(())
}

/// Tile indices covering the half-open pixel span `[start, end)`.
fn tile_span(start: i64, end: i64, tile_size: i64) -> std::ops::RangeInclusive<i64> {
    start.div_euclid(tile_size)..=(end - 1).div_euclid(tile_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTileStore, TileStore};
    use image::Rgba;

    const TS: u32 = 4;

    fn solid_tile(v: u8) -> Vec<u8> {
        vec![v; crate::store::bytes_per_tile(TS)]
    }

    #[test]
    fn copies_across_tile_boundaries() {
        let mut store = MemoryTileStore::new(TS);
        store.store_tile(TileAddress::new(-1, 0, 0), &solid_tile(10)).unwrap();
        store.store_tile(TileAddress::new(0, 0, 0), &solid_tile(20)).unwrap();

        let mut dst = RgbaImage::new(4, 2);
        copy_pixels(&store, 0, PixelRect::new(-2, 1, 4, 2), &mut dst, (0, 0)).unwrap();

        assert_eq!(*dst.get_pixel(0, 0), Rgba([10; 4]));
        assert_eq!(*dst.get_pixel(1, 1), Rgba([10; 4]));
        assert_eq!(*dst.get_pixel(2, 0), Rgba([20; 4]));
        assert_eq!(*dst.get_pixel(3, 1), Rgba([20; 4]));
    }

    #[test]
    fn absent_tiles_leave_destination_untouched() {
        let mut store = MemoryTileStore::new(TS);
        store.store_tile(TileAddress::new(1, 0, 0), &solid_tile(99)).unwrap();

        let mut dst = RgbaImage::from_pixel(8, 4, Rgba([7, 7, 7, 7]));
        copy_pixels(&store, 0, PixelRect::new(0, 0, 8, 4), &mut dst, (0, 0)).unwrap();

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(*dst.get_pixel(x, y), Rgba([7; 4]), "({x},{y})");
            }
            for x in 4..8 {
                assert_eq!(*dst.get_pixel(x, y), Rgba([99; 4]), "({x},{y})");
            }
        }
    }

    #[test]
    fn respects_frame_and_destination_origin() {
        let mut store = MemoryTileStore::new(TS);
        store.store_tile(TileAddress::new(0, 0, 3), &solid_tile(50)).unwrap();

        let mut dst = RgbaImage::new(4, 4);
        copy_pixels(&store, 0, PixelRect::new(0, 0, 2, 2), &mut dst, (1, 1)).unwrap();
        assert!(dst.pixels().all(|p| *p == Rgba([0; 4])));

        copy_pixels(&store, 3, PixelRect::new(0, 0, 2, 2), &mut dst, (1, 1)).unwrap();
        assert_eq!(*dst.get_pixel(0, 0), Rgba([0; 4]));
        assert_eq!(*dst.get_pixel(1, 1), Rgba([50; 4]));
        assert_eq!(*dst.get_pixel(2, 2), Rgba([50; 4]));
        assert_eq!(*dst.get_pixel(3, 3), Rgba([0; 4]));
    }

    #[test]
    fn region_is_clipped_to_destination() {
        let mut store = MemoryTileStore::new(TS);
        store.store_tile(TileAddress::new(0, 0, 0), &solid_tile(1)).unwrap();

        let mut dst = RgbaImage::new(2, 2);
        copy_pixels(&store, 0, PixelRect::new(0, 0, 16, 16), &mut dst, (1, 1)).unwrap();
        assert_eq!(*dst.get_pixel(1, 1), Rgba([1; 4]));
        assert_eq!(*dst.get_pixel(0, 0), Rgba([0; 4]));
    }
}
