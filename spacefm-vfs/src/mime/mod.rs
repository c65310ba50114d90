// SPDX-License-Identifier: LGPL-3.0-only
//! Process-wide MIME type cache.
//!
//! Maps a type string to one shared [`MimeType`] descriptor. The map is
//! dropped and rebuilt when the shared-mime-info database on disk changes;
//! descriptors handed out earlier stay valid but are no longer shared.

pub mod actions;
pub mod database;
pub mod detector;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::event_loop::LoopHandle;
use crate::filesystem::error::VfsResult;
use crate::filesystem::monitor::{FileMonitor, MonitorEvent};

pub use actions::MimeActions;
pub use database::{MimeDatabase, MimeInfo};
pub use detector::{
    MimeDetector, MIME_TYPE_DESKTOP, MIME_TYPE_DIRECTORY, MIME_TYPE_SYMLINK, MIME_TYPE_UNKNOWN,
    MIME_TYPE_ZEROSIZE,
};

/// Descriptor for one MIME type.
///
/// Description and icon come from the database snapshot the descriptor was
/// created with, resolved on first use.
pub struct MimeType {
    type_name: String,
    database: Arc<MimeDatabase>,
    info: OnceCell<MimeInfo>,
    description: OnceCell<String>,
}

impl MimeType {
    fn new(type_name: &str, database: Arc<MimeDatabase>) -> Self {
        Self {
            type_name: type_name.to_string(),
            database,
            info: OnceCell::new(),
            description: OnceCell::new(),
        }
    }

    /// The type string, e.g. `text/plain`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn info(&self) -> &MimeInfo {
        self.info.get_or_init(|| self.database.lookup(&self.type_name))
    }

    /// Human-readable description; the unknown type's description if the
    /// database has none for this type.
    pub fn description(&self) -> &str {
        self.description.get_or_init(|| {
            if let Some(desc) = self.info().description.clone() {
                return desc;
            }
            log::warn!("mime-type {} has no description (comment)", self.type_name);
            self.database
                .lookup(MIME_TYPE_UNKNOWN)
                .description
                .unwrap_or_else(|| "Unknown".to_string())
        })
    }

    /// Icon name candidates, best first.
    pub fn icon_names(&self) -> Vec<String> {
        if self.type_name == MIME_TYPE_DIRECTORY {
            return vec!["folder".to_string(), "inode-directory".to_string()];
        }

        let mut names = Vec::new();
        if let Some(icon) = &self.info().icon {
            names.push(icon.clone());
        }
        if let Ok(mime) = self.type_name.parse::<::mime::Mime>() {
            names.push(format!("{}-{}", mime.type_(), mime.subtype()));
            match &self.info().generic_icon {
                Some(generic) => names.push(generic.clone()),
                None => names.push(format!("{}-x-generic", mime.type_())),
            }
        }
        names.push("unknown".to_string());
        names.dedup();
        names
    }

    /// Best icon name.
    pub fn icon_name(&self) -> String {
        self.icon_names()
            .into_iter()
            .next()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Default application desktop id.
    pub fn default_action(&self) -> Option<String> {
        self.database.actions().default_action(&self.type_name)
    }

    /// All application desktop ids associated with this type.
    pub fn actions(&self) -> Vec<String> {
        self.database.actions().actions(&self.type_name)
    }

    pub fn is_unknown(&self) -> bool {
        self.type_name == MIME_TYPE_UNKNOWN
    }

    pub fn is_directory(&self) -> bool {
        self.type_name == MIME_TYPE_DIRECTORY
    }

    pub fn is_desktop_entry(&self) -> bool {
        self.type_name == MIME_TYPE_DESKTOP
    }

    pub fn is_image(&self) -> bool {
        self.type_name.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.type_name.starts_with("video/")
    }

    pub fn is_text(&self) -> bool {
        self.type_name.starts_with("text/")
            || matches!(
                self.type_name.as_str(),
                "application/json" | "application/xml" | "application/x-shellscript" | "application/javascript"
            )
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            "application/x-executable"
                | "application/x-pie-executable"
                | "application/x-sharedlib"
                | "application/x-shellscript"
                | "application/x-sh"
                | "text/x-shellscript"
        )
    }

    pub fn is_archive(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            "application/zip"
                | "application/x-tar"
                | "application/gzip"
                | "application/x-gzip"
                | "application/x-bzip2"
                | "application/x-xz"
                | "application/x-7z-compressed"
                | "application/vnd.rar"
                | "application/x-rar-compressed"
                | "application/zstd"
        )
    }
}

impl std::fmt::Debug for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MimeType").field(&self.type_name).finish()
    }
}

/// Identifier returned by [`MimeTypeCache::add_reload_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReloadCallbackId(u64);

type ReloadCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Where a fresh database snapshot comes from on reload.
type DatabaseSource = Arc<dyn Fn() -> MimeDatabase + Send + Sync + 'static>;

struct MimeCacheInner {
    types: Mutex<HashMap<String, Arc<MimeType>>>,
    database: RwLock<Arc<MimeDatabase>>,
    source: DatabaseSource,
    reload_callbacks: Mutex<Vec<(ReloadCallbackId, ReloadCallback)>>,
    next_callback_id: AtomicU64,
    monitors: Mutex<Vec<FileMonitor>>,
    reload_pending: AtomicBool,
}

/// Shared, cloneable handle to the MIME type cache.
#[derive(Clone)]
pub struct MimeTypeCache {
    inner: Arc<MimeCacheInner>,
}

impl MimeTypeCache {
    /// Cache over the current user's XDG MIME database.
    pub fn new() -> Self {
        Self::with_source(MimeDatabase::load_default)
    }

    /// Cache over a custom database; `source` is called again on every reload.
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> MimeDatabase + Send + Sync + 'static,
    {
        let database = Arc::new(source());
        Self {
            inner: Arc::new(MimeCacheInner {
                types: Mutex::new(HashMap::new()),
                database: RwLock::new(database),
                source: Arc::new(source),
                reload_callbacks: Mutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(1),
                monitors: Mutex::new(Vec::new()),
                reload_pending: AtomicBool::new(false),
            }),
        }
    }

    /// Shared descriptor for `type_name`.
    pub fn get_from_type(&self, type_name: &str) -> Arc<MimeType> {
        let mut types = self.inner.types.lock();
        if let Some(existing) = types.get(type_name) {
            return existing.clone();
        }
        let database = self.inner.database.read().clone();
        let mime = Arc::new(MimeType::new(type_name, database));
        types.insert(type_name.to_string(), mime.clone());
        mime
    }

    /// Resolve by file name alone.
    pub fn get_from_file_name(&self, name: &str) -> Arc<MimeType> {
        let type_name = MimeDetector::detect_mime_type_from_name(name)
            .unwrap_or_else(|| MIME_TYPE_UNKNOWN.to_string());
        self.get_from_type(&type_name)
    }

    /// Resolve a file on disk. Never fails; unresolvable files get the unknown type.
    pub fn get_from_file(
        &self,
        path: &Path,
        stat: Option<&Metadata>,
        base_name: Option<&str>,
    ) -> Arc<MimeType> {
        let type_name = MimeDetector::detect(path, stat, base_name);
        self.get_from_type(&type_name)
    }

    /// The unknown type.
    pub fn unknown(&self) -> Arc<MimeType> {
        self.get_from_type(MIME_TYPE_UNKNOWN)
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.inner.types.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current database snapshot.
    pub fn database(&self) -> Arc<MimeDatabase> {
        self.inner.database.read().clone()
    }

    /// Drop every cached descriptor, reread the database, then run the
    /// reload callbacks in registration order.
    pub fn reload(&self) {
        self.inner.reload_pending.store(false, Ordering::SeqCst);
        let database = Arc::new((self.inner.source)());
        *self.inner.database.write() = database;
        self.inner.types.lock().clear();
        log::debug!("MimeTypeCache: reloaded mime database");

        let callbacks: Vec<ReloadCallback> = self
            .inner
            .reload_callbacks
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in callbacks {
            cb();
        }
    }

    /// Run `callback` after every reload.
    pub fn add_reload_callback<F>(&self, callback: F) -> ReloadCallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ReloadCallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::SeqCst));
        self.inner.reload_callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a reload callback. Returns whether it was registered.
    pub fn remove_reload_callback(&self, id: ReloadCallbackId) -> bool {
        let mut callbacks = self.inner.reload_callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(cb_id, _)| *cb_id != id);
        callbacks.len() != before
    }

    /// Watch the database directories; changes schedule one reload per
    /// `debounce` window on the event loop.
    ///
    /// Returns the number of directories watched. A directory whose watch
    /// cannot be installed is skipped with a warning.
    pub fn watch_database(&self, handle: &LoopHandle, debounce: Duration) -> VfsResult<usize> {
        self.unwatch_database();

        let mut monitors = Vec::new();
        for dir in self.database().mime_dirs() {
            let weak: Weak<MimeCacheInner> = Arc::downgrade(&self.inner);
            let loop_handle = handle.clone();
            let watched = dir.clone();
            let created = FileMonitor::create(&dir, handle.clone(), move |event, path| {
                if event == MonitorEvent::Other {
                    return;
                }
                if path != watched && !database::is_database_file(path) {
                    return;
                }
                schedule_reload(&weak, &loop_handle, debounce);
            });

            match created {
                Ok(monitor) => monitors.push(monitor),
                Err(e) => log::warn!("MimeTypeCache: cannot watch {:?}: {}", dir, e),
            }
        }

        let count = monitors.len();
        *self.inner.monitors.lock() = monitors;
        Ok(count)
    }

    /// Remove every database watch.
    pub fn unwatch_database(&self) {
        let monitors = std::mem::take(&mut *self.inner.monitors.lock());
        drop(monitors);
    }

    /// Number of installed database watches.
    pub fn watch_count(&self) -> usize {
        self.inner.monitors.lock().len()
    }

    /// Whether a coalesced reload is waiting on the event loop.
    pub fn is_reload_pending(&self) -> bool {
        self.inner.reload_pending.load(Ordering::SeqCst)
    }
}

fn schedule_reload(weak: &Weak<MimeCacheInner>, handle: &LoopHandle, debounce: Duration) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if inner.reload_pending.swap(true, Ordering::SeqCst) {
        return;
    }

    let weak = weak.clone();
    let posted = handle.invoke_after(debounce, move || {
        if let Some(inner) = weak.upgrade() {
            MimeTypeCache { inner }.reload();
        }
    });
    if posted.is_err() {
        inner.reload_pending.store(false, Ordering::SeqCst);
    }
}

impl Default for MimeTypeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MimeTypeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MimeTypeCache")
            .field("types", &self.len())
            .field("watches", &self.watch_count())
            .finish()
    }
}
