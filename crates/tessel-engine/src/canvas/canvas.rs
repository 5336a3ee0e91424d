use std::path::{Path, PathBuf};

use crate::coords::ColorRgba;
use crate::error::{Error, Result};
use crate::store::{read_json, write_json_atomically, LayerProperties, StoreBackend};
use crate::tiling::TileBounds;

use super::document::CanvasDocument;
use super::{CanvasPreset, CanvasSize, Layer, LayerId, NewLayer, ViewState};

const METADATA_FILE: &str = "metadata.json";

/// Ordered layers plus canvas-level settings and view state.
///
/// Every setter persists the canvas document when the value actually
/// changes; writing an identical value does not touch the backend.
pub struct Canvas {
    document: CanvasDocument,
    layers: Vec<Layer>,
    backend: StoreBackend,
}

impl Canvas {
    /// Creates an empty canvas whose layers live in memory.
    pub fn in_memory(preset: &CanvasPreset) -> Self {
        Self {
            document: CanvasDocument::from_preset(preset),
            layers: Vec::new(),
            backend: StoreBackend::Memory,
        }
    }

    /// Writes a fresh canvas document into `root`.
    ///
    /// Fails with [`Error::InvalidArgument`] when `root` already holds a canvas.
    pub fn initialize(root: impl Into<PathBuf>, preset: &CanvasPreset) -> Result<Self> {
        let root = root.into();
        let path = root.join(METADATA_FILE);
        if path.exists() {
            return Err(Error::InvalidArgument(format!(
                "canvas already initialized at {}",
                root.display()
            )));
        }

        std::fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        let document = CanvasDocument::from_preset(preset);
        write_json_atomically(&path, &document)?;

        log::info!("initialized canvas at {}", root.display());
        Ok(Self {
            document,
            layers: Vec::new(),
            backend: StoreBackend::Directory(root),
        })
    }

    /// Opens a canvas directory written by [`Canvas::initialize`].
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(METADATA_FILE);
        if !path.exists() {
            return Err(Error::NotFound(format!("canvas at {}", root.display())));
        }

        let document: CanvasDocument = read_json(&path)?;
        let backend = StoreBackend::Directory(root);
        let layers = document
            .layers
            .iter()
            .map(|id| {
                let (store, properties) = backend.open_layer(id.as_str(), document.tile_size)?;
                Ok(Layer::new(id.clone(), properties, store))
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("opened canvas with {} layers", layers.len());
        Ok(Self { document, layers, backend })
    }

    // ── settings ──────────────────────────────────────────────────────────

    pub fn canvas_size(&self) -> Option<CanvasSize> {
        self.document.canvas_size
    }

    pub fn tile_size(&self) -> u32 {
        self.document.tile_size
    }

    pub fn bytes_per_tile(&self) -> usize {
        crate::store::bytes_per_tile(self.document.tile_size)
    }

    pub fn fps(&self) -> u32 {
        self.document.fps
    }

    pub fn background(&self) -> ColorRgba {
        self.document.background
    }

    pub fn view(&self) -> ViewState {
        self.document.view
    }

    pub fn current_frame(&self) -> i32 {
        self.document.current_frame
    }

    /// Canvas root directory for file-backed canvases.
    pub fn root(&self) -> Option<&Path> {
        match &self.backend {
            StoreBackend::Memory => None,
            StoreBackend::Directory(root) => Some(root),
        }
    }

    /// Inclusive tile range covering a bounded canvas centered on the origin.
    pub fn tile_bounds(&self) -> TileBounds {
        let Some(size) = self.document.canvas_size else {
            return TileBounds::UNBOUNDED;
        };

        let ts = self.document.tile_size as f32;
        let half_w = size.width as f32 / 2.0;
        let half_h = size.height as f32 / 2.0;
        TileBounds::new(
            (-half_w / ts).floor() as i32,
            (-half_h / ts).floor() as i32,
            (half_w / ts).ceil() as i32 - 1,
            (half_h / ts).ceil() as i32 - 1,
        )
    }

    pub fn set_background(&mut self, background: ColorRgba) -> Result<()> {
        self.commit(|d| d.background = background)
    }

    pub fn set_fps(&mut self, fps: u32) -> Result<()> {
        self.commit(|d| d.fps = fps)
    }

    pub fn set_view(&mut self, view: ViewState) -> Result<()> {
        self.commit(|d| d.view = view)
    }

    pub fn set_current_frame(&mut self, frame: i32) -> Result<()> {
        self.commit(|d| d.current_frame = frame)
    }

    // ── layers ────────────────────────────────────────────────────────────

    /// Layers in compositing order, bottom first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn layer_index(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    pub fn current_layer(&self) -> Option<usize> {
        self.document.current_layer
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.document.current_layer.and_then(|i| self.layers.get(i))
    }

    pub fn selected_layer_mut(&mut self) -> Option<&mut Layer> {
        self.document.current_layer.and_then(|i| self.layers.get_mut(i))
    }

    pub fn set_current_layer(&mut self, index: Option<usize>) -> Result<()> {
        if let Some(i) = index {
            if i >= self.layers.len() {
                return Err(Error::InvalidArgument(format!(
                    "layer index {i} out of range (0..{})",
                    self.layers.len()
                )));
            }
        }
        self.commit(|d| d.current_layer = index)
    }

    /// Inserts an empty layer and selects it when nothing is selected.
    pub fn add_layer(&mut self, new: NewLayer) -> Result<LayerId> {
        let index = new.insert_before.unwrap_or(self.layers.len());
        if index > self.layers.len() {
            return Err(Error::InvalidArgument(format!(
                "insert position {index} out of range (0..={})",
                self.layers.len()
            )));
        }

        let id = LayerId::generate();
        let properties = LayerProperties {
            name: new
                .name
                .unwrap_or_else(|| format!("Layer {}", self.layers.len() + 1)),
            blending: new.blending,
            opacity: new.opacity.clamp(0.0, 1.0),
        };
        let store = self
            .backend
            .create_layer(id.as_str(), self.document.tile_size, &properties)?;

        let current = match self.document.current_layer {
            None => Some(index),
            Some(i) if i >= index => Some(i + 1),
            keep => keep,
        };
        self.commit(|d| {
            d.layers.insert(index, id.clone());
            d.current_layer = current;
        })?;
        self.layers.insert(index, Layer::new(id.clone(), properties, store));

        log::debug!("added {id} at {index}");
        Ok(id)
    }

    /// Removes a layer and its stored tiles.
    ///
    /// Selection moves to the last remaining layer, or none.
    pub fn remove_layer(&mut self, id: &LayerId) -> Result<()> {
        let Some(index) = self.layer_index(id) else {
            return Err(Error::NotFound(format!("layer {id}")));
        };

        let last = self.layers.len().checked_sub(2);
        self.commit(|d| {
            d.layers.remove(index);
            d.current_layer = last;
        })?;
        self.layers.remove(index);
        self.backend.remove_layer(id.as_str())?;

        log::debug!("removed {id}");
        Ok(())
    }

    // ── persistence ───────────────────────────────────────────────────────

    fn commit(&mut self, edit: impl FnOnce(&mut CanvasDocument)) -> Result<()> {
        let mut next = self.document.clone();
        edit(&mut next);
        if next == self.document {
            return Ok(());
        }

        if let StoreBackend::Directory(root) = &self.backend {
            write_json_atomically(&root.join(METADATA_FILE), &next)?;
        }
        self.document = next;
        Ok(())
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("backend", &self.backend)
            .field("document", &self.document)
            .field("layers", &self.layers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::Blending;
    use crate::coords::Vec2;
    use crate::store::testing::{patterned_tile, TempDir};
    use crate::store::TileAddress;

    fn named(name: &str) -> NewLayer {
        NewLayer { name: Some(name.into()), ..NewLayer::default() }
    }

    fn names(canvas: &Canvas) -> Vec<&str> {
        canvas.layers().iter().map(|l| l.name()).collect()
    }

    // ── layers ────────────────────────────────────────────────────────────

    #[test]
    fn first_layer_is_auto_selected() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        assert_eq!(canvas.current_layer(), None);

        canvas.add_layer(NewLayer::default()).unwrap();
        assert_eq!(canvas.current_layer(), Some(0));
        assert_eq!(canvas.selected_layer().unwrap().name(), "Layer 1");
    }

    #[test]
    fn insert_before_orders_layers() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        canvas.add_layer(named("a")).unwrap();
        canvas.add_layer(named("c")).unwrap();
        canvas.add_layer(NewLayer { insert_before: Some(1), ..named("b") }).unwrap();
        assert_eq!(names(&canvas), ["a", "b", "c"]);
    }

    #[test]
    fn selection_follows_layer_when_inserting_below() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        canvas.add_layer(named("a")).unwrap();
        canvas.add_layer(NewLayer { insert_before: Some(0), ..named("under") }).unwrap();
        assert_eq!(canvas.selected_layer().unwrap().name(), "a");
    }

    #[test]
    fn out_of_range_insert_is_invalid() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        let err = canvas
            .add_layer(NewLayer { insert_before: Some(1), ..NewLayer::default() })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(canvas.layers().is_empty());
    }

    #[test]
    fn remove_selects_last_remaining() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        let a = canvas.add_layer(named("a")).unwrap();
        canvas.add_layer(named("b")).unwrap();
        canvas.add_layer(named("c")).unwrap();

        canvas.remove_layer(&a).unwrap();
        assert_eq!(names(&canvas), ["b", "c"]);
        assert_eq!(canvas.current_layer(), Some(1));

        let ids: Vec<_> = canvas.layers().iter().map(|l| l.id().clone()).collect();
        for id in &ids {
            canvas.remove_layer(id).unwrap();
        }
        assert_eq!(canvas.current_layer(), None);
    }

    #[test]
    fn remove_unknown_layer_is_not_found() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        let err = canvas.remove_layer(&LayerId::generate()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn selection_index_is_range_checked() {
        let mut canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        canvas.add_layer(NewLayer::default()).unwrap();
        assert!(canvas.set_current_layer(Some(1)).is_err());
        canvas.set_current_layer(None).unwrap();
        assert!(canvas.selected_layer().is_none());
    }

    // ── bounds ────────────────────────────────────────────────────────────

    #[test]
    fn tile_bounds_cover_centered_canvas() {
        let canvas = Canvas::in_memory(&CanvasPreset::screen(512, 512));
        assert_eq!(canvas.tile_bounds(), TileBounds::new(-1, -1, 0, 0));

        let canvas = Canvas::in_memory(&CanvasPreset::screen(600, 100));
        assert_eq!(canvas.tile_bounds(), TileBounds::new(-2, -1, 1, 0));

        let canvas = Canvas::in_memory(&CanvasPreset::INFINITE);
        assert_eq!(canvas.tile_bounds(), TileBounds::UNBOUNDED);
    }

    // ── persistence ───────────────────────────────────────────────────────

    #[test]
    fn file_canvas_reopens_with_layers_and_tiles() {
        let dir = TempDir::new("tessel-canvas");
        let root = dir.path().join("canvas");
        let addr = TileAddress::new(0, -1, 0);

        let id = {
            let mut canvas = Canvas::initialize(&root, &CanvasPreset::screen(512, 512)).unwrap();
            let id = canvas.add_layer(named("ink")).unwrap();
            let layer = canvas.layer_mut(&id).unwrap();
            layer.set_blending(Blending::StraightSourceOver).unwrap();
            layer.store_mut().store_tile(addr, &patterned_tile(256, 4)).unwrap();
            canvas
                .set_view(ViewState { offset: Vec2::new(3.0, 4.0), zoom: 2.0, rotation: 15.0 })
                .unwrap();
            id
        };

        let canvas = Canvas::open(&root).unwrap();
        assert_eq!(canvas.canvas_size(), Some(CanvasSize::new(512, 512)));
        assert_eq!(canvas.view().zoom, 2.0);
        assert_eq!(canvas.current_layer(), Some(0));

        let layer = canvas.layer(&id).unwrap();
        assert_eq!(layer.name(), "ink");
        assert_eq!(layer.blending(), Blending::StraightSourceOver);
        assert!(layer.store().is_tile_present(addr));
    }

    #[test]
    fn initialize_twice_fails() {
        let dir = TempDir::new("tessel-canvas");
        Canvas::initialize(dir.path(), &CanvasPreset::INFINITE).unwrap();
        let err = Canvas::initialize(dir.path(), &CanvasPreset::INFINITE).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn open_missing_canvas_is_not_found() {
        let dir = TempDir::new("tessel-canvas");
        assert!(matches!(Canvas::open(dir.path().join("x")), Err(Error::NotFound(_))));
    }

    #[test]
    fn removed_layer_directory_is_deleted() {
        let dir = TempDir::new("tessel-canvas");
        let mut canvas = Canvas::initialize(dir.path(), &CanvasPreset::INFINITE).unwrap();
        let id = canvas.add_layer(NewLayer::default()).unwrap();
        assert!(dir.path().join(id.as_str()).is_dir());

        canvas.remove_layer(&id).unwrap();
        assert!(!dir.path().join(id.as_str()).exists());
        assert!(Canvas::open(dir.path()).unwrap().layers().is_empty());
    }

    #[test]
    fn identical_settings_do_not_rewrite_document() {
        let dir = TempDir::new("tessel-canvas");
        let mut canvas = Canvas::initialize(dir.path(), &CanvasPreset::INFINITE).unwrap();
        let meta = dir.path().join(METADATA_FILE);
        std::fs::remove_file(&meta).unwrap();

        canvas.set_fps(24).unwrap();
        canvas.set_background(ColorRgba::white()).unwrap();
        canvas.set_view(ViewState::default()).unwrap();
        assert!(!meta.exists());

        canvas.set_fps(12).unwrap();
        assert!(meta.exists());
    }
}
