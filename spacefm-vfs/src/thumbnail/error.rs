// SPDX-License-Identifier: LGPL-3.0-only
//! Error types for thumbnail operations.

use std::path::PathBuf;
use thiserror::Error;

/// Why a thumbnail could not be provided.
#[derive(Error, Debug)]
pub enum ThumbnailError {
    /// The file type is not supported for thumbnails.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// No thumbnail exists in the cache.
    #[error("No cached thumbnail for {0:?}")]
    NotCached(PathBuf),

    /// The cached thumbnail is older than the file.
    #[error("Stale thumbnail for {0:?}")]
    Stale(PathBuf),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
