use std::collections::HashMap;

use crate::error::Result;

use super::{check_tile_buffer, LayerProperties, TileAddress, TileStore};

/// Tile store kept entirely in memory. Nothing survives the process.
#[derive(Debug)]
pub struct MemoryTileStore {
    tile_size: u32,
    tiles: HashMap<TileAddress, Box<[u8]>>,
}

impl MemoryTileStore {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            tiles: HashMap::new(),
        }
    }
}

impl TileStore for MemoryTileStore {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn is_tile_present(&self, address: TileAddress) -> bool {
        self.tiles.contains_key(&address)
    }

    fn load_tile(&self, address: TileAddress, dst: &mut [u8]) -> Result<bool> {
        check_tile_buffer(dst.len(), self.tile_size)?;

        let Some(tile) = self.tiles.get(&address) else {
            return Ok(false);
        };

        dst[..tile.len()].copy_from_slice(tile);
        Ok(true)
    }

    fn store_tile(&mut self, address: TileAddress, src: &[u8]) -> Result<()> {
        check_tile_buffer(src.len(), self.tile_size)?;

        let len = self.bytes_per_tile();
        match self.tiles.get_mut(&address) {
            Some(tile) => tile.copy_from_slice(&src[..len]),
            None => {
                self.tiles.insert(address, src[..len].into());
            }
        }
        Ok(())
    }

    fn tiles(&self) -> Vec<TileAddress> {
        self.tiles.keys().copied().collect()
    }

    fn write_properties(&mut self, _properties: &LayerProperties) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::testing::patterned_tile;

    const TS: u32 = 8;

    #[test]
    fn absent_until_first_store() {
        let mut store = MemoryTileStore::new(TS);
        let a = TileAddress::new(-3, 7, 0);
        assert!(!store.is_tile_present(a));

        store.store_tile(a, &patterned_tile(TS, 1)).unwrap();
        assert!(store.is_tile_present(a));
        assert!(store.is_tile_present(a));
        assert!(!store.is_tile_present(TileAddress::new(-3, 7, 1)));
    }

    #[test]
    fn load_returns_stored_bytes() {
        let mut store = MemoryTileStore::new(TS);
        let a = TileAddress::new(2, 2, 4);
        let tile = patterned_tile(TS, 9);
        store.store_tile(a, &tile).unwrap();

        let mut out = vec![0u8; tile.len()];
        assert!(store.load_tile(a, &mut out).unwrap());
        assert_eq!(out, tile);
    }

    #[test]
    fn overwrite_replaces_content() {
        let mut store = MemoryTileStore::new(TS);
        let a = TileAddress::new(0, 0, 0);
        store.store_tile(a, &patterned_tile(TS, 1)).unwrap();
        store.store_tile(a, &patterned_tile(TS, 2)).unwrap();

        let mut out = vec![0u8; store.bytes_per_tile()];
        store.load_tile(a, &mut out).unwrap();
        assert_eq!(out, patterned_tile(TS, 2));
        assert_eq!(store.tiles(), vec![a]);
    }

    #[test]
    fn absent_load_leaves_destination_untouched() {
        let store = MemoryTileStore::new(TS);
        let mut out = vec![0xAB; store.bytes_per_tile()];
        assert!(!store.load_tile(TileAddress::new(1, 1, 0), &mut out).unwrap());
        assert!(out.iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn transparent_write_counts_as_present() {
        let mut store = MemoryTileStore::new(TS);
        let a = TileAddress::new(5, 5, 0);
        store.store_tile(a, &vec![0u8; store.bytes_per_tile()]).unwrap();
        assert!(store.is_tile_present(a));
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut store = MemoryTileStore::new(TS);
        let short = vec![0u8; store.bytes_per_tile() - 1];
        let a = TileAddress::new(0, 0, 0);

        assert!(matches!(store.store_tile(a, &short), Err(Error::InvalidArgument(_))));
        assert!(!store.is_tile_present(a));

        let mut short = short;
        assert!(matches!(store.load_tile(a, &mut short), Err(Error::InvalidArgument(_))));
    }
}
