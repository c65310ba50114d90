// SPDX-License-Identifier: LGPL-3.0-only
//! Cache path computation and freshness checks for thumbnails.
//!
//! Paths follow the freedesktop.org Thumbnail Managing Standard:
//! `$XDG_CACHE_HOME/thumbnails/{normal,large,x-large,xx-large}/<md5(uri)>.png`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::filesystem::entry::FileEntry;
use crate::thumbnail::{Thumbnail, ThumbnailError, ThumbnailProvider};

/// Root of the shared thumbnail cache, `~/.cache/thumbnails` by default.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(".cache")
        })
        .join("thumbnails")
}

/// Size class directory name for an edge length.
pub fn size_class(size: u32) -> &'static str {
    match size {
        0..=128 => "normal",
        129..=256 => "large",
        257..=512 => "x-large",
        _ => "xx-large",
    }
}

/// Cache file for `uri` at `size` under `root`.
pub fn thumbnail_cache_path(root: &Path, uri: &str, size: u32) -> PathBuf {
    root.join(size_class(size)).join(format!("{}.png", file_uri_to_md5(uri)))
}

/// MD5 of a file URI, lowercase hex.
pub fn file_uri_to_md5(uri: &str) -> String {
    let digest = md5::compute(uri.as_bytes());
    format!("{:x}", digest)
}

/// A thumbnail is fresh when it is at least as new as the file it depicts.
pub fn is_thumbnail_fresh(thumbnail_path: &Path, file_path: &Path) -> bool {
    let thumbnail_mtime = match fs::metadata(thumbnail_path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let file_mtime = match fs::metadata(file_path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    thumbnail_mtime >= file_mtime
}

/// Serves thumbnails other programs already put into the shared cache.
#[derive(Debug, Clone)]
pub struct FreedesktopThumbnails {
    root: PathBuf,
}

impl FreedesktopThumbnails {
    pub fn new() -> Self {
        Self::with_root(default_cache_root())
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for FreedesktopThumbnails {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailProvider for FreedesktopThumbnails {
    fn load(&self, entry: &FileEntry, size: u32) -> Result<Thumbnail, ThumbnailError> {
        if !self.is_supported(entry) {
            return Err(ThumbnailError::UnsupportedFileType(
                entry.mime_type().type_name().to_string(),
            ));
        }

        let path = thumbnail_cache_path(&self.root, &entry.uri(), size);
        if !path.exists() {
            return Err(ThumbnailError::NotCached(entry.path().to_path_buf()));
        }
        if !is_thumbnail_fresh(&path, entry.path()) {
            return Err(ThumbnailError::Stale(entry.path().to_path_buf()));
        }

        log::trace!("Thumbnail cache hit: {:?}", path);
        Ok(Thumbnail::new(path, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::{MimeDatabase, MimeTypeCache};

    #[test]
    fn test_size_classes() {
        assert_eq!(size_class(64), "normal");
        assert_eq!(size_class(128), "normal");
        assert_eq!(size_class(256), "large");
        assert_eq!(size_class(512), "x-large");
        assert_eq!(size_class(1024), "xx-large");
    }

    #[test]
    fn test_md5_of_uri() {
        // Reference value from the Thumbnail Managing Standard.
        assert_eq!(
            file_uri_to_md5("file:///home/jens/photos/me.png"),
            "c6ee772d9e49320e97ec29a7eb5b1697"
        );
    }

    #[test]
    fn test_provider_serves_fresh_cached_thumbnail() {
        let files = tempfile::tempdir().unwrap();
        let cache_root = tempfile::tempdir().unwrap();
        let image = files.path().join("photo.png");
        fs::write(&image, b"png bytes").unwrap();

        let mime_cache = MimeTypeCache::with_source(|| MimeDatabase::new(Vec::new(), Vec::new()));
        let entry = FileEntry::create(&image, &mime_cache).unwrap();
        let provider = FreedesktopThumbnails::with_root(cache_root.path().to_path_buf());

        assert!(matches!(provider.load(&entry, 128), Err(ThumbnailError::NotCached(_))));

        let cached = thumbnail_cache_path(cache_root.path(), &entry.uri(), 128);
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"thumb").unwrap();

        let thumb = provider.load(&entry, 128).unwrap();
        assert_eq!(thumb.path, cached);
        assert_eq!(thumb.size, 128);
    }
}
