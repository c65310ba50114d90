// SPDX-License-Identifier: LGPL-3.0-only
//! Thumbnail lookup for directory entries.
//!
//! Directories never decode images themselves. They hand entries to a
//! [`ThumbnailProvider`] on a background queue and announce the result to
//! their subscribers.

use std::path::PathBuf;

use crate::filesystem::entry::FileEntry;

pub mod cache;
pub mod error;
pub mod executor;

pub use cache::FreedesktopThumbnails;
pub use error::ThumbnailError;
pub use executor::Thumbnailer;

/// A thumbnail image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// PNG file holding the image.
    pub path: PathBuf,
    /// Requested edge length in pixels.
    pub size: u32,
}

impl Thumbnail {
    pub fn new(path: PathBuf, size: u32) -> Self {
        Self { path, size }
    }
}

/// Source of thumbnails.
///
/// `load` runs on a thumbnailer thread and may block.
pub trait ThumbnailProvider: Send + Sync + 'static {
    /// Thumbnail of `entry` at `size`, or why there is none.
    fn load(&self, entry: &FileEntry, size: u32) -> Result<Thumbnail, ThumbnailError>;

    /// Whether `entry` can have a thumbnail at all.
    fn is_supported(&self, entry: &FileEntry) -> bool {
        entry.is_regular_file() && (entry.is_image() || entry.is_video())
    }
}
