use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::canvas::{Canvas, CanvasPreset, NewLayer};
use crate::error::{Error, Result};

use super::{Library, Preferences};

const CONTENT_DIR: &str = "content";
const PREFERENCES_FILE: &str = "preferences.json";
const THUMBNAIL_FILE: &str = "thumbnail.png";
const CANVAS_METADATA: &str = "metadata.json";

/// Library laid out as `<root>/content/<canvas-id>/` directories.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    /// Opens (creating if needed) a library rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let content = root.join(CONTENT_DIR);
        std::fs::create_dir_all(&content).map_err(|e| Error::io(&content, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canvas_root(&self, canvas_id: &str) -> PathBuf {
        self.root.join(CONTENT_DIR).join(canvas_id)
    }

    pub fn thumbnail_path(&self, canvas_id: &str) -> PathBuf {
        self.canvas_root(canvas_id).join(THUMBNAIL_FILE)
    }

    /// Creates a canvas with one empty layer and returns its id.
    pub fn create_canvas(&self, preset: &CanvasPreset) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut canvas = Canvas::initialize(self.canvas_root(&id), preset)?;
        canvas.add_layer(NewLayer::default())?;
        log::info!("created canvas {id}");
        Ok(id)
    }

    /// Ids of every canvas in the library, sorted.
    pub fn list_canvases(&self) -> Result<Vec<String>> {
        let content = self.root.join(CONTENT_DIR);
        let entries = std::fs::read_dir(&content).map_err(|e| Error::io(&content, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&content, e))?;
            if !entry.path().join(CANVAS_METADATA).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::load_or_default(&self.root.join(PREFERENCES_FILE))
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        preferences.save(&self.root.join(PREFERENCES_FILE))
    }
}

impl Library for DirectoryLibrary {
    fn load_canvas(&self, canvas_id: &str) -> Result<Canvas> {
        Canvas::open(self.canvas_root(canvas_id))
    }

    fn put_thumbnail(&self, canvas_id: &str, thumbnail: &RgbaImage) -> Result<()> {
        let root = self.canvas_root(canvas_id);
        if !root.is_dir() {
            return Err(Error::NotFound(format!("canvas {canvas_id}")));
        }

        let path = root.join(THUMBNAIL_FILE);
        let tmp = root.join("thumbnail.tmp.png");
        thumbnail
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(|source| Error::Image { path: tmp.clone(), source })?;
        std::fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;

        log::debug!(
            "thumbnail {}x{} written for {canvas_id}",
            thumbnail.width(),
            thumbnail.height()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::TempDir;
    use image::Rgba;

    #[test]
    fn created_canvas_loads_with_one_layer() {
        let dir = TempDir::new("tessel-library");
        let library = DirectoryLibrary::open(dir.path()).unwrap();
        let id = library.create_canvas(&CanvasPreset::screen(800, 600)).unwrap();

        assert_eq!(library.list_canvases().unwrap(), vec![id.clone()]);
        let canvas = library.load_canvas(&id).unwrap();
        assert_eq!(canvas.layers().len(), 1);
        assert_eq!(canvas.current_layer(), Some(0));
        assert_eq!(canvas.tile_size(), 256);
    }

    #[test]
    fn unknown_canvas_is_not_found() {
        let dir = TempDir::new("tessel-library");
        let library = DirectoryLibrary::open(dir.path()).unwrap();
        assert!(matches!(library.load_canvas("missing"), Err(Error::NotFound(_))));

        let thumb = RgbaImage::new(1, 1);
        assert!(matches!(library.put_thumbnail("missing", &thumb), Err(Error::NotFound(_))));
    }

    #[test]
    fn thumbnail_is_written_as_png() {
        let dir = TempDir::new("tessel-library");
        let library = DirectoryLibrary::open(dir.path()).unwrap();
        let id = library.create_canvas(&CanvasPreset::INFINITE).unwrap();

        let thumb = RgbaImage::from_pixel(4, 2, Rgba([1, 2, 3, 255]));
        library.put_thumbnail(&id, &thumb).unwrap();

        let back = image::open(library.thumbnail_path(&id)).unwrap().to_rgba8();
        assert_eq!(back, thumb);
    }
}
