use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::{Size, SourceRect};

/// Source image could not be opened or decoded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source image not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read source image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl LoadError {
    /// Distinguishes a deleted file from one that exists but will not decode.
    pub(crate) fn from_image(path: &std::path::Path, err: image::ImageError) -> Self {
        match &err {
            image::ImageError::IoError(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                LoadError::Missing(path.to_path_buf())
            }
            _ => LoadError::Decode {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// A drag that cannot become a crop rectangle. Discarded without reaching the user.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    #[error("selection has no area")]
    Degenerate,
    #[error("selection does not intersect the image")]
    OutsideImage,
    #[error("pointer released without an active drag")]
    NotDragging,
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("crop {rect} lies outside the {}x{} source image", image.width, image.height)]
    OutOfBounds { rect: SourceRect, image: Size },
    #[error("failed to prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write cropped image {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode cropped image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize session records: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write sidecar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown image id: {0}")]
    UnknownId(String),
    #[error("failed to scan project root {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// The finished document could not be saved. The session store is unaffected.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to save report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<PersistError> for Error {
    fn from(err: PersistError) -> Self {
        Error::Store(StoreError::Persist(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
