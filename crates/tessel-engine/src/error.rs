//! Error types for the canvas model, tile stores and library.
//!
//! GPU and runtime glue report through `anyhow`; everything that touches
//! persisted canvas data reports through [`Error`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed a value the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A canvas, layer or library id did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("image encoding failed for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
