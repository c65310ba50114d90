// SPDX-License-Identifier: LGPL-3.0-only
//! Registry of live directories, keyed by canonical path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::filesystem::directory::{Directory, DirectoryServices};
use crate::filesystem::error::{VfsError, VfsResult};

/// Canonical path to the directory living there. Holds no strong references.
pub(crate) type DirectoryMap = Mutex<HashMap<PathBuf, Weak<Directory>>>;

struct CacheInner {
    map: Arc<DirectoryMap>,
    /// Serializes construction so one path never gets two scans.
    creating: Mutex<()>,
    services: DirectoryServices,
    scans_started: AtomicU64,
}

/// Weak cache of [`Directory`] instances.
///
/// A directory stays registered exactly as long as someone outside the cache
/// holds it; the last drop unregisters it.
#[derive(Clone)]
pub struct DirectoryCache {
    inner: Arc<CacheInner>,
}

impl DirectoryCache {
    pub fn new(services: DirectoryServices) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                map: Arc::new(Mutex::new(HashMap::new())),
                creating: Mutex::new(()),
                services,
                scans_started: AtomicU64::new(0),
            }),
        }
    }

    /// The live directory for `path`, or a new one that starts scanning.
    ///
    /// Paths are canonicalized first, so `.`/`..` and symlinks that resolve
    /// to the same directory share one instance.
    pub fn get_or_create(&self, path: &Path) -> VfsResult<Arc<Directory>> {
        let canonical = canonicalize(path)?;
        if !canonical.is_dir() {
            return Err(VfsError::NotADirectory(canonical));
        }

        let _creating = self.inner.creating.lock();
        if let Some(existing) = self.lookup(&canonical) {
            return Ok(existing);
        }

        let dir = Directory::open(
            canonical.clone(),
            self.inner.services.clone(),
            Arc::downgrade(&self.inner.map),
        )?;
        self.inner.scans_started.fetch_add(1, Ordering::SeqCst);
        self.inner.map.lock().insert(canonical, Arc::downgrade(&dir));
        log::debug!("DirectoryCache: opened {:?}", dir.path());
        Ok(dir)
    }

    /// The live directory for `path`, never constructing one.
    pub fn get_soft(&self, path: &Path) -> Option<Arc<Directory>> {
        let canonical = canonicalize(path).ok()?;
        self.lookup(&canonical)
    }

    fn lookup(&self, canonical: &Path) -> Option<Arc<Directory>> {
        self.inner.map.lock().get(canonical).and_then(Weak::upgrade)
    }

    /// Every directory that is currently alive.
    pub fn live_directories(&self) -> Vec<Arc<Directory>> {
        let map = self.inner.map.lock();
        map.values().filter_map(Weak::upgrade).collect()
    }

    /// Number of live directories.
    pub fn len(&self) -> usize {
        self.inner
            .map
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initial scans started since the cache was built.
    pub fn scans_started(&self) -> u64 {
        self.inner.scans_started.load(Ordering::SeqCst)
    }

    pub fn services(&self) -> &DirectoryServices {
        &self.inner.services
    }

    /// Re-resolve MIME types in every live directory.
    pub fn reload_mime_types(&self) {
        for dir in self.live_directories() {
            dir.reload_mime_type();
        }
    }

    /// Callback that schedules [`DirectoryCache::reload_mime_types`] on the
    /// event loop without keeping the cache alive.
    pub(crate) fn mime_reload_callback(&self) -> impl Fn() + Send + Sync + 'static {
        let weak = Arc::downgrade(&self.inner);
        let handle = self.inner.services.handle.clone();
        move || {
            let weak = weak.clone();
            let posted = handle.invoke(move || {
                if let Some(inner) = weak.upgrade() {
                    DirectoryCache { inner }.reload_mime_types();
                }
            });
            if posted.is_err() {
                log::debug!("Event loop closed, MIME reload not propagated");
            }
        }
    }
}

impl std::fmt::Debug for DirectoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCache")
            .field("live", &self.len())
            .field("scans_started", &self.scans_started())
            .finish()
    }
}

fn canonicalize(path: &Path) -> VfsResult<PathBuf> {
    path.canonicalize()
        .map_err(|_| VfsError::InvalidPath(path.to_path_buf()))
}
