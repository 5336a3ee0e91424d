//! Canvas library: resolves canvas ids and stores thumbnails.

mod directory;
mod preferences;

pub use directory::DirectoryLibrary;
pub use preferences::{GeneralPreferences, Preferences};

use image::RgbaImage;

use crate::canvas::Canvas;
use crate::error::Result;

/// Service the canvas session loads from and reports thumbnails to.
pub trait Library: Send {
    /// Loads a canvas by id. Unknown ids fail with `Error::NotFound`.
    fn load_canvas(&self, canvas_id: &str) -> Result<Canvas>;

    /// Replaces the stored thumbnail of a canvas.
    fn put_thumbnail(&self, canvas_id: &str, thumbnail: &RgbaImage) -> Result<()>;
}
