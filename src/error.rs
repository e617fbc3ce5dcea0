use std::path::{Path, PathBuf};

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Library error type for leanframe operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The media file could not be opened, stat'd, or decoded by any backend.
    #[error("media unavailable: {}", path.display())]
    MediaUnavailable {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Neither the primary nor the fallback external player could play the file.
    #[error("external player failed for {}", path.display())]
    ExternalPlayer {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn media_unavailable(path: &Path, source: impl Into<BoxError>) -> Self {
        Self::MediaUnavailable {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    pub fn is_media_unavailable(&self) -> bool {
        matches!(self, Self::MediaUnavailable { .. })
    }
}
