// SPDX-License-Identifier: LGPL-3.0-only
//! Process-wide VFS state, owned explicitly.
//!
//! Build one [`VfsContext`] per event loop, call [`VfsContext::init`] before
//! opening directories and [`VfsContext::shutdown`] when done.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::config::VfsConfig;
use crate::event_loop::LoopHandle;
use crate::filesystem::directory::{Directory, DirectoryServices};
use crate::filesystem::volume::{self, ChangeProne};
use crate::filesystem::{DirectoryCache, VfsResult};
use crate::mime::{MimeTypeCache, ReloadCallbackId};
use crate::thumbnail::executor::ThumbnailSizes;
use crate::thumbnail::{FreedesktopThumbnails, ThumbnailProvider};

/// Builder for [`VfsContext`]; every collaborator can be swapped.
pub struct VfsContextBuilder {
    handle: LoopHandle,
    config: VfsConfig,
    mime_cache: Option<MimeTypeCache>,
    thumbnails: Option<Arc<dyn ThumbnailProvider>>,
    change_prone: Option<ChangeProne>,
}

impl VfsContextBuilder {
    pub fn config(mut self, config: VfsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mime_cache(mut self, mime_cache: MimeTypeCache) -> Self {
        self.mime_cache = Some(mime_cache);
        self
    }

    pub fn thumbnail_provider(mut self, provider: Arc<dyn ThumbnailProvider>) -> Self {
        self.thumbnails = Some(provider);
        self
    }

    /// Replace the mount-table classification used for avoid-changes.
    pub fn change_prone<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.change_prone = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> VfsContext {
        let mime_cache = self.mime_cache.unwrap_or_default();
        let change_prone = self
            .change_prone
            .unwrap_or_else(|| volume::mount_table_predicate(self.config.change_prone_filesystems.clone()));
        let thumbnails = self
            .thumbnails
            .unwrap_or_else(|| Arc::new(FreedesktopThumbnails::new()));

        let services = DirectoryServices {
            handle: self.handle.clone(),
            mime_cache: mime_cache.clone(),
            thumbnails,
            change_prone,
            debounce: self.config.debounce(),
            thumbnail_sizes: ThumbnailSizes {
                small: self.config.small_thumbnail_size,
                big: self.config.big_thumbnail_size,
            },
        };

        VfsContext {
            handle: self.handle,
            config: self.config,
            mime_cache,
            directories: DirectoryCache::new(services),
            reload_callback: Mutex::new(None),
        }
    }
}

/// Owner of the directory cache and the MIME type cache.
pub struct VfsContext {
    handle: LoopHandle,
    config: VfsConfig,
    mime_cache: MimeTypeCache,
    directories: DirectoryCache,
    reload_callback: Mutex<Option<ReloadCallbackId>>,
}

impl VfsContext {
    pub fn builder(handle: LoopHandle) -> VfsContextBuilder {
        VfsContextBuilder {
            handle,
            config: VfsConfig::default(),
            mime_cache: None,
            thumbnails: None,
            change_prone: None,
        }
    }

    /// Context with default collaborators.
    pub fn new(handle: LoopHandle, config: VfsConfig) -> Self {
        Self::builder(handle).config(config).build()
    }

    /// Hook MIME reloads up to the live directories and, if configured,
    /// start watching the MIME database. Calling it twice is harmless.
    pub fn init(&self) -> VfsResult<()> {
        let mut reload_callback = self.reload_callback.lock();
        if reload_callback.is_none() {
            let id = self
                .mime_cache
                .add_reload_callback(self.directories.mime_reload_callback());
            *reload_callback = Some(id);
        }

        if self.config.watch_mime_database {
            let watched = self.mime_cache.watch_database(&self.handle, self.config.debounce())?;
            log::debug!("VfsContext: watching {} MIME directories", watched);
        }
        Ok(())
    }

    /// Stop MIME watching and drop cached descriptors. Directories already
    /// handed out keep working.
    pub fn shutdown(&self) {
        self.mime_cache.unwatch_database();
        if let Some(id) = self.reload_callback.lock().take() {
            self.mime_cache.remove_reload_callback(id);
        }
        self.mime_cache.reload();
        log::debug!("VfsContext: shut down");
    }

    /// Shared directory for `path`. See [`DirectoryCache::get_or_create`].
    pub fn open_directory(&self, path: &Path) -> VfsResult<Arc<Directory>> {
        self.directories.get_or_create(path)
    }

    pub fn directories(&self) -> &DirectoryCache {
        &self.directories
    }

    pub fn mime_cache(&self) -> &MimeTypeCache {
        &self.mime_cache
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }
}

impl std::fmt::Debug for VfsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsContext")
            .field("config", &self.config)
            .field("directories", &self.directories)
            .field("mime_cache", &self.mime_cache)
            .finish()
    }
}
