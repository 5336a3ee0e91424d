use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::blend::Blending;
use crate::error::{Error, Result};

use super::{check_tile_buffer, LayerProperties, TileAddress, TileStore};

const METADATA_FILE: &str = "metadata.json";

/// Layer `metadata.json`: attributes plus the present-tile index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LayerDocument {
    name: String,
    blending: Blending,
    opacity: f32,
    tiles: BTreeSet<TileAddress>,
}

/// Tile store backed by a layer directory.
///
/// ```text
/// <layer>/metadata.json
/// <layer>/frame<F>/tile<X>x<Y>.bin
/// ```
///
/// The index in `metadata.json` decides presence. A tile payload is fully
/// written and renamed into place before its address enters the index, so an
/// interrupted write leaves the tile absent rather than torn.
#[derive(Debug)]
pub struct FileTileStore {
    root: PathBuf,
    tile_size: u32,
    document: LayerDocument,
}

impl FileTileStore {
    /// Creates the layer directory and writes an empty index.
    pub fn create(root: PathBuf, tile_size: u32, properties: LayerProperties) -> Result<Self> {
        std::fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;

        let document = LayerDocument {
            name: properties.name,
            blending: properties.blending,
            opacity: properties.opacity,
            tiles: BTreeSet::new(),
        };
        write_json_atomically(&root.join(METADATA_FILE), &document)?;

        log::debug!("created layer store at {}", root.display());
        Ok(Self { root, tile_size, document })
    }

    pub fn open(root: PathBuf, tile_size: u32) -> Result<Self> {
        let path = root.join(METADATA_FILE);
        if !path.exists() {
            return Err(Error::NotFound(format!("layer metadata {}", path.display())));
        }

        let document: LayerDocument = read_json(&path)?;
        log::debug!(
            "opened layer store {} ({} tiles)",
            root.display(),
            document.tiles.len()
        );
        Ok(Self { root, tile_size, document })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn properties(&self) -> LayerProperties {
        LayerProperties {
            name: self.document.name.clone(),
            blending: self.document.blending,
            opacity: self.document.opacity,
        }
    }

    fn tile_path(&self, address: TileAddress) -> PathBuf {
        self.root
            .join(format!("frame{}", address.frame))
            .join(format!("tile{}x{}.bin", address.x, address.y))
    }

    /// Writes `document` as the index and adopts it only once it is on disk.
    fn commit(&mut self, document: LayerDocument) -> Result<()> {
        write_json_atomically(&self.root.join(METADATA_FILE), &document)?;
        self.document = document;
        Ok(())
    }
}

impl TileStore for FileTileStore {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn is_tile_present(&self, address: TileAddress) -> bool {
        self.document.tiles.contains(&address)
    }

    fn load_tile(&self, address: TileAddress, dst: &mut [u8]) -> Result<bool> {
        check_tile_buffer(dst.len(), self.tile_size)?;

        if !self.is_tile_present(address) {
            return Ok(false);
        }

        let path = self.tile_path(address);
        let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let len = self.bytes_per_tile();
        if bytes.len() != len {
            return Err(Error::io(
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("tile file holds {} bytes, expected {len}", bytes.len()),
                ),
            ));
        }

        dst[..len].copy_from_slice(&bytes);
        Ok(true)
    }

    fn store_tile(&mut self, address: TileAddress, src: &[u8]) -> Result<()> {
        check_tile_buffer(src.len(), self.tile_size)?;

        let path = self.tile_path(address);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        write_atomically(&path, &src[..self.bytes_per_tile()])?;

        if self.document.tiles.contains(&address) {
            return Ok(());
        }
        let mut document = self.document.clone();
        document.tiles.insert(address);
        self.commit(document)
    }

    fn tiles(&self) -> Vec<TileAddress> {
        self.document.tiles.iter().copied().collect()
    }

    fn write_properties(&mut self, properties: &LayerProperties) -> Result<()> {
        if self.properties() == *properties {
            return Ok(());
        }

        let document = LayerDocument {
            name: properties.name.clone(),
            blending: properties.blending,
            opacity: properties.opacity,
            tiles: self.document.tiles.clone(),
        };
        self.commit(document)
    }
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

pub(crate) fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::json(path, e))?;
    write_atomically(path, &bytes)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{patterned_tile, TempDir};

    const TS: u32 = 16;

    fn new_store(dir: &TempDir) -> FileTileStore {
        FileTileStore::create(dir.path().join("layer-a"), TS, LayerProperties::default()).unwrap()
    }

    #[test]
    fn round_trip_through_disk() {
        let dir = TempDir::new("tessel-file-store");
        let mut store = new_store(&dir);
        let a = TileAddress::new(-1, 3, 2);
        let tile = patterned_tile(TS, 7);
        store.store_tile(a, &tile).unwrap();

        let reopened = FileTileStore::open(dir.path().join("layer-a"), TS).unwrap();
        assert!(reopened.is_tile_present(a));

        let mut out = vec![0u8; tile.len()];
        assert!(reopened.load_tile(a, &mut out).unwrap());
        assert_eq!(out, tile);
        assert!(dir.path().join("layer-a/frame2/tile-1x3.bin").exists());
    }

    #[test]
    fn payload_without_index_entry_is_absent() {
        let dir = TempDir::new("tessel-file-store");
        let store = new_store(&dir);
        let a = TileAddress::new(0, 0, 0);

        // Simulates a crash between payload write and index update.
        let path = store.tile_path(a);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, patterned_tile(TS, 3)).unwrap();

        let reopened = FileTileStore::open(dir.path().join("layer-a"), TS).unwrap();
        assert!(!reopened.is_tile_present(a));
        let mut out = vec![0x11; reopened.bytes_per_tile()];
        assert!(!reopened.load_tile(a, &mut out).unwrap());
        assert!(out.iter().all(|b| *b == 0x11));
    }

    #[test]
    fn index_is_written_once_per_new_address() {
        let dir = TempDir::new("tessel-file-store");
        let mut store = new_store(&dir);
        let meta = dir.path().join("layer-a").join(METADATA_FILE);
        let a = TileAddress::new(4, 4, 0);

        store.store_tile(a, &patterned_tile(TS, 1)).unwrap();
        let first = std::fs::metadata(&meta).unwrap().modified().unwrap();
        let doc_before = std::fs::read(&meta).unwrap();

        store.store_tile(a, &patterned_tile(TS, 2)).unwrap();
        assert_eq!(std::fs::read(&meta).unwrap(), doc_before);
        assert_eq!(std::fs::metadata(&meta).unwrap().modified().unwrap(), first);
    }

    #[test]
    fn identical_properties_do_not_rewrite() {
        let dir = TempDir::new("tessel-file-store");
        let mut store = new_store(&dir);
        let meta = dir.path().join("layer-a").join(METADATA_FILE);
        std::fs::remove_file(&meta).unwrap();

        store.write_properties(&LayerProperties::default()).unwrap();
        assert!(!meta.exists());

        let renamed = LayerProperties { name: "Ink".into(), ..LayerProperties::default() };
        store.write_properties(&renamed).unwrap();
        let reopened = FileTileStore::open(dir.path().join("layer-a"), TS).unwrap();
        assert_eq!(reopened.properties(), renamed);
    }

    #[test]
    fn open_missing_layer_is_not_found() {
        let dir = TempDir::new("tessel-file-store");
        let err = FileTileStore::open(dir.path().join("nope"), TS).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let dir = TempDir::new("tessel-file-store");
        let mut store = new_store(&dir);
        let a = TileAddress::new(1, 1, 0);
        store.store_tile(a, &patterned_tile(TS, 5)).unwrap();
        std::fs::write(store.tile_path(a), [0u8; 3]).unwrap();

        let mut out = vec![0u8; store.bytes_per_tile()];
        assert!(matches!(store.load_tile(a, &mut out), Err(Error::Io { .. })));
    }

    #[test]
    fn failed_index_write_leaves_tile_absent() {
        let dir = TempDir::new("tessel-file-store");
        let mut store = new_store(&dir);
        let a = TileAddress::new(0, 0, 0);
        let tile = patterned_tile(TS, 3);

        // A directory in the way of the index temp file makes the index write fail.
        let blocker = dir.path().join("layer-a").join("metadata.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(store.store_tile(a, &tile).is_err());
        assert!(!store.is_tile_present(a));
        assert!(store.tiles().is_empty());

        let reopened = FileTileStore::open(dir.path().join("layer-a"), TS).unwrap();
        assert!(!reopened.is_tile_present(a));

        std::fs::remove_dir(&blocker).unwrap();
        store.store_tile(a, &tile).unwrap();
        assert!(store.is_tile_present(a));
    }
}
