//! Sparse tile storage for canvas layers.
//!
//! Every layer owns one [`TileStore`]. Stores map a [`TileAddress`] to a
//! `tile_size² × 4` byte RGBA8 buffer (row-major, top row first). A tile is
//! present once it has been written, whatever its content.
//!
//! Two backends share the contract and are picked through [`StoreBackend`]:
//! [`MemoryTileStore`] and [`FileTileStore`].

mod address;
mod copy;
mod file;
mod memory;

pub use address::TileAddress;
pub use copy::{copy_pixels, PixelRect};
pub use file::FileTileStore;
pub use memory::MemoryTileStore;

pub(crate) use file::{read_json, write_json_atomically};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::blend::Blending;
use crate::error::{Error, Result};

/// Layer attributes persisted next to the tile index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerProperties {
    pub name: String,
    pub blending: Blending,
    pub opacity: f32,
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            name: "Layer".to_string(),
            blending: Blending::PremultipliedSourceOver,
            opacity: 1.0,
        }
    }
}

/// Tile-addressed pixel storage for one layer.
pub trait TileStore: Send {
    /// Edge length of a tile in pixels.
    fn tile_size(&self) -> u32;

    /// Size in bytes of one tile buffer.
    fn bytes_per_tile(&self) -> usize {
        bytes_per_tile(self.tile_size())
    }

    fn is_tile_present(&self, address: TileAddress) -> bool;

    /// Copies a stored tile into `dst`.
    ///
    /// Returns `Ok(false)` and leaves `dst` untouched when the tile is absent.
    fn load_tile(&self, address: TileAddress, dst: &mut [u8]) -> Result<bool>;

    /// Creates or overwrites a tile and marks it present.
    fn store_tile(&mut self, address: TileAddress, src: &[u8]) -> Result<()>;

    /// Snapshot of every present address.
    fn tiles(&self) -> Vec<TileAddress>;

    /// Persists layer attributes. Writing identical attributes is a no-op.
    fn write_properties(&mut self, properties: &LayerProperties) -> Result<()>;
}

#[inline]
pub fn bytes_per_tile(tile_size: u32) -> usize {
    tile_size as usize * tile_size as usize * 4
}

pub(crate) fn check_tile_buffer(len: usize, tile_size: u32) -> Result<()> {
    let needed = bytes_per_tile(tile_size);
    if len < needed {
        return Err(Error::InvalidArgument(format!(
            "tile buffer holds {len} bytes, {needed} required"
        )));
    }
    Ok(())
}

/// Selects where layer stores live.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    /// Canvas root directory; each layer gets a subdirectory named by its id.
    Directory(PathBuf),
}

impl StoreBackend {
    /// Creates an empty store for a new layer.
    pub fn create_layer(
        &self,
        layer_id: &str,
        tile_size: u32,
        properties: &LayerProperties,
    ) -> Result<Box<dyn TileStore>> {
        match self {
            StoreBackend::Memory => Ok(Box::new(MemoryTileStore::new(tile_size))),
            StoreBackend::Directory(root) => Ok(Box::new(FileTileStore::create(
                root.join(layer_id),
                tile_size,
                properties.clone(),
            )?)),
        }
    }

    /// Opens the store of an existing layer along with its attributes.
    pub fn open_layer(
        &self,
        layer_id: &str,
        tile_size: u32,
    ) -> Result<(Box<dyn TileStore>, LayerProperties)> {
        match self {
            StoreBackend::Memory => Err(Error::NotFound(format!(
                "layer {layer_id} (memory stores are not persisted)"
            ))),
            StoreBackend::Directory(root) => {
                let store = FileTileStore::open(root.join(layer_id), tile_size)?;
                let properties = store.properties();
                Ok((Box::new(store), properties))
            }
        }
    }

    /// Deletes whatever a removed layer left behind.
    pub fn remove_layer(&self, layer_id: &str) -> Result<()> {
        match self {
            StoreBackend::Memory => Ok(()),
            StoreBackend::Directory(root) => {
                let dir = root.join(layer_id);
                match std::fs::remove_dir_all(&dir) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(Error::io(dir, e)),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};

    /// Scratch directory removed on drop.
    pub struct TempDir(PathBuf);

    impl TempDir {
        pub fn new(prefix: &str) -> Self {
            let path = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    /// Tile buffer whose bytes depend on `seed` and position.
    pub fn patterned_tile(tile_size: u32, seed: u8) -> Vec<u8> {
        (0..super::bytes_per_tile(tile_size))
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }
}
