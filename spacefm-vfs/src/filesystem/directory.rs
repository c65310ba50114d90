// SPDX-License-Identifier: LGPL-3.0-only
//! Live, incrementally updated listing of one directory.
//!
//! A [`Directory`] scans its path on a background thread, then keeps the
//! listing current from kernel watch events. Events are buffered and drained
//! once per debounce window; every notification reaches subscribers on the
//! event-loop thread, in subscription order.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::async_loader::{AsyncLoader, CancelToken};
use crate::event_loop::LoopHandle;
use crate::filesystem::cache::DirectoryMap;
use crate::filesystem::entry::FileEntry;
use crate::filesystem::error::VfsResult;
use crate::filesystem::hidden;
use crate::filesystem::monitor::{FileMonitor, MonitorEvent};
use crate::filesystem::volume::ChangeProne;
use crate::mime::MimeTypeCache;
use crate::thumbnail::executor::ThumbnailSizes;
use crate::thumbnail::{ThumbnailProvider, Thumbnailer};

/// Notification delivered to directory subscribers.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// A new entry appeared.
    FileCreated(Arc<FileEntry>),
    /// An entry is gone. `None` means the directory itself was deleted.
    FileDeleted(Option<Arc<FileEntry>>),
    /// An entry was modified. `None` means the directory itself changed.
    FileChanged(Option<Arc<FileEntry>>),
    /// The initial scan finished or was cancelled.
    FileListed { cancelled: bool },
    /// A thumbnail slot of an entry was filled.
    ThumbnailLoaded(Arc<FileEntry>),
}

/// Handle returned by [`Directory::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&DirectoryEvent) + Send + Sync + 'static>;

/// Collaborators every directory needs.
#[derive(Clone)]
pub struct DirectoryServices {
    pub handle: LoopHandle,
    pub mime_cache: MimeTypeCache,
    pub thumbnails: Arc<dyn ThumbnailProvider>,
    pub change_prone: ChangeProne,
    /// Coalescing window for watch events.
    pub debounce: Duration,
    pub thumbnail_sizes: ThumbnailSizes,
}

impl std::fmt::Debug for DirectoryServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryServices")
            .field("debounce", &self.debounce)
            .field("thumbnail_sizes", &self.thumbnail_sizes)
            .finish_non_exhaustive()
    }
}

/// State shared with the scan thread.
#[derive(Default)]
struct DirectoryState {
    files: Vec<Arc<FileEntry>>,
    /// Names in `files`.
    names: HashSet<OsString>,
    hidden_count: u64,
    pending_created: Vec<OsString>,
    pending_changed: Vec<Arc<FileEntry>>,
    drain_scheduled: bool,
}

impl DirectoryState {
    fn find(&self, name: &OsStr, entry: Option<&Arc<FileEntry>>) -> Option<Arc<FileEntry>> {
        self.files
            .iter()
            .find(|f| entry.is_some_and(|e| Arc::ptr_eq(e, *f)) || f.name() == name)
            .cloned()
    }

    fn contains(&self, entry: &Arc<FileEntry>) -> bool {
        self.files.iter().any(|f| Arc::ptr_eq(f, entry))
    }

    /// Add `entry` unless its name is already listed.
    fn insert(&mut self, entry: Arc<FileEntry>) -> bool {
        if !self.names.insert(entry.name().to_os_string()) {
            return false;
        }
        self.files.push(entry);
        true
    }

    fn remove(&mut self, entry: &Arc<FileEntry>) {
        let before = self.files.len();
        self.files.retain(|f| !Arc::ptr_eq(f, entry));
        if self.files.len() != before {
            self.names.remove(entry.name());
        }
    }

    fn clear(&mut self) {
        self.files.clear();
        self.names.clear();
        self.pending_created.clear();
        self.pending_changed.clear();
    }

    fn is_pending_change(&self, entry: &Arc<FileEntry>) -> bool {
        self.pending_changed.iter().any(|f| Arc::ptr_eq(f, entry))
    }
}

/// Live listing of one canonical path. Obtain through [`crate::DirectoryCache`].
pub struct Directory {
    path: PathBuf,
    services: DirectoryServices,
    self_ref: Weak<Directory>,
    registry: Weak<DirectoryMap>,
    state: Arc<Mutex<DirectoryState>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    loader: Mutex<Option<AsyncLoader>>,
    monitor: Mutex<Option<FileMonitor>>,
    thumbnailer: Mutex<Option<Thumbnailer>>,
    file_listed: AtomicBool,
    load_complete: AtomicBool,
    avoid_changes: AtomicBool,
}

impl Directory {
    /// Watch `path` and start the initial scan.
    ///
    /// `path` must already be canonical. Fails if the watch or the scan
    /// thread cannot be set up.
    pub(crate) fn open(
        path: PathBuf,
        services: DirectoryServices,
        registry: Weak<DirectoryMap>,
    ) -> VfsResult<Arc<Self>> {
        let avoid_changes = (services.change_prone)(&path);
        let dir = Arc::new_cyclic(|self_ref| Self {
            path,
            services,
            self_ref: self_ref.clone(),
            registry,
            state: Arc::new(Mutex::new(DirectoryState::default())),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            loader: Mutex::new(None),
            monitor: Mutex::new(None),
            thumbnailer: Mutex::new(None),
            file_listed: AtomicBool::new(false),
            load_complete: AtomicBool::new(false),
            avoid_changes: AtomicBool::new(avoid_changes),
        });

        dir.install_monitor()?;
        dir.start_scan()?;
        Ok(dir)
    }

    fn install_monitor(&self) -> VfsResult<()> {
        let weak = self.self_ref.clone();
        let monitor = FileMonitor::create(&self.path, self.services.handle.clone(), move |event, path| {
            if let Some(dir) = weak.upgrade() {
                dir.on_monitor_event(event, path);
            }
        })?;
        *self.monitor.lock() = Some(monitor);
        Ok(())
    }

    fn start_scan(&self) -> VfsResult<()> {
        let path = self.path.clone();
        let state = self.state.clone();
        let mime_cache = self.services.mime_cache.clone();
        let handle = self.services.handle.clone();
        let weak = self.self_ref.clone();

        let loader = AsyncLoader::new("dir-scan", move |token| {
            scan_directory(&path, &state, &mime_cache, token);

            let posted = handle.invoke(move || {
                if let Some(dir) = weak.upgrade() {
                    dir.on_list_task_finished();
                }
            });
            if posted.is_err() {
                log::warn!("Event loop closed before listing of {:?} finished", path);
            }
        });

        let weak = self.self_ref.clone();
        loader.add_finish_handler(move |cancelled| {
            if let Some(dir) = weak.upgrade() {
                dir.finish_listing(cancelled);
            }
        });

        loader.run()?;
        *self.loader.lock() = Some(loader);
        Ok(())
    }

    /// Join the finished scan thread; its finish handler emits the listing.
    fn on_list_task_finished(&self) {
        let loader = self.loader.lock().take();
        if let Some(loader) = loader {
            loader.join();
        }
    }

    fn finish_listing(&self, cancelled: bool) {
        self.file_listed.store(true, Ordering::SeqCst);
        self.load_complete.store(true, Ordering::SeqCst);
        log::debug!(
            "Directory {:?} listed ({} entries, cancelled: {})",
            self.path,
            self.state.lock().files.len(),
            cancelled
        );
        self.emit(vec![DirectoryEvent::FileListed { cancelled }]);
    }

    fn on_monitor_event(&self, event: MonitorEvent, path: &Path) {
        let name = if path == self.path {
            self.path.as_os_str()
        } else {
            match path.file_name() {
                Some(name) => name,
                None => return,
            }
        };

        match event {
            MonitorEvent::Created => self.emit_file_created(name, false),
            MonitorEvent::Deleted => self.emit_file_deleted(name, None),
            MonitorEvent::Changed => self.emit_file_changed(name, None, false),
            MonitorEvent::Other if path == self.path => self.rescan(),
            MonitorEvent::Other => log::trace!("Directory {:?}: unclassified event on {:?}", self.path, path),
        }
    }

    /// Re-check the whole listing after the backend lost events.
    ///
    /// Every listed entry is queued for a re-stat and every unlisted name on
    /// disk for creation; the next drain reports the differences.
    fn rescan(&self) {
        log::debug!("Directory {:?}: watch backend asked for a rescan", self.path);
        let on_disk: Vec<OsString> = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.file_name())).collect(),
            Err(e) => {
                log::warn!("Cannot rescan {:?}: {}", self.path, e);
                return;
            },
        };
        let hidden: HashSet<OsString> = hidden::get_hidden_files(&self.path)
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut state = self.state.lock();
        for name in on_disk {
            if hidden.contains(&name) || state.names.contains(&name) || state.pending_created.contains(&name) {
                continue;
            }
            state.pending_created.push(name);
        }
        let listed = state.files.clone();
        for entry in listed {
            if !state.is_pending_change(&entry) {
                state.pending_changed.push(entry);
            }
        }
        self.schedule_drain(&mut state);
    }

    fn is_self(&self, name: &OsStr) -> bool {
        name.is_empty() || name == self.path.as_os_str()
    }

    /// Queue `name` as created. Creation is never subject to avoid-changes.
    pub fn emit_file_created(&self, name: &OsStr, _force: bool) {
        if self.is_self(name) {
            return;
        }
        let mut state = self.state.lock();
        if !state.pending_created.iter().any(|n| n == name) {
            state.pending_created.push(name.to_os_string());
        }
        self.schedule_drain(&mut state);
    }

    /// Queue the entry named `name` (or `entry` itself) for a re-stat that
    /// decides between changed and deleted. The directory's own path clears
    /// the listing immediately.
    pub fn emit_file_deleted(&self, name: &OsStr, entry: Option<&Arc<FileEntry>>) {
        if self.is_self(name) {
            {
                self.state.lock().clear();
            }
            log::debug!("Directory {:?} was deleted", self.path);
            self.emit(vec![DirectoryEvent::FileDeleted(None)]);
            return;
        }

        let mut state = self.state.lock();
        if let Some(found) = state.find(name, entry) {
            if !state.is_pending_change(&found) {
                state.pending_changed.push(found);
            }
            self.schedule_drain(&mut state);
        }
    }

    /// Queue the entry named `name` (or `entry` itself) for a re-stat.
    ///
    /// Without `force` this is ignored while avoid-changes is set.
    pub fn emit_file_changed(&self, name: &OsStr, entry: Option<&Arc<FileEntry>>, force: bool) {
        if !force && self.avoid_changes() {
            return;
        }
        if self.is_self(name) {
            self.emit(vec![DirectoryEvent::FileChanged(None)]);
            return;
        }

        let mut state = self.state.lock();
        if let Some(found) = state.find(name, entry) {
            if !state.is_pending_change(&found) {
                state.pending_changed.push(found);
            }
            self.schedule_drain(&mut state);
        }
    }

    /// Arm the drain timer unless it is already armed.
    fn schedule_drain(&self, state: &mut DirectoryState) {
        if state.drain_scheduled {
            return;
        }
        state.drain_scheduled = true;

        let weak = self.self_ref.clone();
        let posted = self.services.handle.invoke_after(self.services.debounce, move || {
            if let Some(dir) = weak.upgrade() {
                dir.drain();
            }
        });
        if posted.is_err() {
            log::warn!("Event loop closed, updates to {:?} are lost", self.path);
            state.drain_scheduled = false;
        }
    }

    /// Resolve both pending buffers: creates first, then changes.
    fn drain(&self) {
        let mime_cache = &self.services.mime_cache;
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            state.drain_scheduled = false;
            let created = std::mem::take(&mut state.pending_created);
            let changed = std::mem::take(&mut state.pending_changed);
            let mut handled: Vec<Arc<FileEntry>> = Vec::new();

            for name in created {
                if let Some(existing) = state.find(&name, None) {
                    if existing.update(mime_cache) {
                        events.push(DirectoryEvent::FileChanged(Some(existing.clone())));
                    } else {
                        state.remove(&existing);
                        events.push(DirectoryEvent::FileDeleted(Some(existing.clone())));
                    }
                    handled.push(existing);
                    continue;
                }

                // Gone again before the drain: created and deleted in one window.
                if let Ok(entry) = FileEntry::create(&self.path.join(&name), mime_cache) {
                    state.insert(entry.clone());
                    events.push(DirectoryEvent::FileCreated(entry));
                }
            }

            for entry in changed {
                if !state.contains(&entry) || handled.iter().any(|h| Arc::ptr_eq(h, &entry)) {
                    continue;
                }
                if entry.update(mime_cache) {
                    events.push(DirectoryEvent::FileChanged(Some(entry)));
                } else {
                    state.remove(&entry);
                    events.push(DirectoryEvent::FileDeleted(Some(entry)));
                }
            }
        }

        if !events.is_empty() {
            log::trace!("Directory {:?}: drained {} notifications", self.path, events.len());
            self.emit(events);
        }
    }

    /// Deliver `events` to every subscriber, in subscription order.
    fn emit(&self, events: Vec<DirectoryEvent>) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for event in &events {
            for subscriber in &subscribers {
                subscriber(event);
            }
        }
    }

    /// Register `callback` for every future notification.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DirectoryEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Canonical path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the visible entries, in no particular order.
    pub fn files(&self) -> Vec<Arc<FileEntry>> {
        self.state.lock().files.clone()
    }

    pub fn find_file(&self, name: &OsStr) -> Option<Arc<FileEntry>> {
        self.state.lock().find(name, None)
    }

    pub fn is_file_listed(&self) -> bool {
        self.file_listed.load(Ordering::SeqCst)
    }

    pub fn is_load_complete(&self) -> bool {
        self.load_complete.load(Ordering::SeqCst)
    }

    pub fn is_directory_empty(&self) -> bool {
        self.state.lock().files.is_empty()
    }

    /// Entries excluded by `.hidden` during the scan.
    pub fn hidden_count(&self) -> u64 {
        self.state.lock().hidden_count
    }

    pub fn avoid_changes(&self) -> bool {
        self.avoid_changes.load(Ordering::SeqCst)
    }

    /// Re-run the change-prone classification, e.g. after a mount change.
    pub fn update_avoid_changes(&self) {
        let avoid = (self.services.change_prone)(&self.path);
        self.avoid_changes.store(avoid, Ordering::SeqCst);
    }

    /// Whether the kernel watch still dispatches events.
    pub fn is_monitored(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(FileMonitor::is_active)
    }

    /// Stop the initial scan early. Subscribers get a cancelled listing.
    pub fn cancel_load(&self) {
        if let Some(loader) = self.loader.lock().as_ref() {
            loader.cancel();
        }
    }

    /// Append `entry`'s name to this directory's `.hidden` list.
    pub fn add_hidden(&self, entry: &FileEntry) -> std::io::Result<()> {
        hidden::add_hidden(&self.path, entry.name())
    }

    /// Re-resolve every entry's MIME type and report each as changed.
    pub fn reload_mime_type(&self) {
        let files = self.files();
        if files.is_empty() {
            return;
        }
        for file in &files {
            file.reload_mime_type(&self.services.mime_cache);
        }
        self.emit(files.into_iter().map(|f| DirectoryEvent::FileChanged(Some(f))).collect());
    }

    /// Queue a thumbnail for `entry`. Subscribers receive
    /// [`DirectoryEvent::ThumbnailLoaded`] once it is available.
    pub fn load_thumbnail(&self, entry: &Arc<FileEntry>, big: bool) -> VfsResult<()> {
        let mut thumbnailer = self.thumbnailer.lock();
        if thumbnailer.is_none() {
            let weak = self.self_ref.clone();
            let handle = self.services.handle.clone();
            let created = Thumbnailer::new(
                self.services.thumbnails.clone(),
                self.services.thumbnail_sizes,
                move |entry| {
                    let weak = weak.clone();
                    let posted = handle.invoke(move || {
                        if let Some(dir) = weak.upgrade() {
                            dir.emit_thumbnail_loaded(&entry);
                        }
                    });
                    if posted.is_err() {
                        log::debug!("Event loop closed, thumbnail notification dropped");
                    }
                },
            )?;
            *thumbnailer = Some(created);
        }
        if let Some(thumbnailer) = thumbnailer.as_ref() {
            thumbnailer.request(entry.clone(), big);
        }
        Ok(())
    }

    /// Drop the thumbnail queue and join its worker.
    pub fn cancel_all_thumbnail_requests(&self) {
        let thumbnailer = self.thumbnailer.lock().take();
        drop(thumbnailer);
    }

    /// Release one thumbnail slot of every entry.
    pub fn unload_thumbnails(&self, big: bool) {
        for file in self.state.lock().files.iter() {
            file.unload_thumbnail(big);
        }
    }

    /// Announce a loaded thumbnail if `entry` still belongs to this directory.
    pub fn emit_thumbnail_loaded(&self, entry: &Arc<FileEntry>) {
        let found = self.state.lock().find(entry.name(), Some(entry));
        if let Some(found) = found {
            self.emit(vec![DirectoryEvent::ThumbnailLoaded(found)]);
        }
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        // Scan thread first: nothing may write into the state after this.
        if let Some(loader) = self.loader.get_mut().take() {
            loader.cancel();
            drop(loader);
        }
        self.thumbnailer.get_mut().take();
        self.monitor.get_mut().take();

        if let Some(registry) = self.registry.upgrade() {
            let mut map = registry.lock();
            if map.get(&self.path).is_some_and(|w| w.strong_count() == 0) {
                map.remove(&self.path);
            }
        }
        log::debug!("Directory {:?} released", self.path);
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("file_listed", &self.is_file_listed())
            .field("avoid_changes", &self.avoid_changes())
            .finish()
    }
}

/// Enumerate `path` into `state`, skipping names listed in `.hidden`.
///
/// Each entry is published as soon as it is stat'd, so watch events that
/// arrive mid-scan find it.
fn scan_directory(path: &Path, state: &Mutex<DirectoryState>, mime_cache: &MimeTypeCache, token: &CancelToken) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list {:?}: {}", path, e);
            return;
        },
    };
    let hidden: HashSet<OsString> = hidden::get_hidden_files(path).unwrap_or_default().into_iter().collect();

    for dirent in entries {
        if token.is_cancelled() {
            log::debug!("Scan of {:?} cancelled", path);
            break;
        }
        let name = match dirent {
            Ok(dirent) => dirent.file_name(),
            Err(e) => {
                log::debug!("Skipping unreadable entry in {:?}: {}", path, e);
                continue;
            },
        };
        if hidden.contains(&name) {
            state.lock().hidden_count += 1;
            continue;
        }

        let full_path = path.join(&name);
        let entry = match FileEntry::create(&full_path, mime_cache) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping {:?} in {:?}: {}", name, path, e);
                continue;
            },
        };

        let mut state = state.lock();
        // A deletion between the stat and here was dispatched before this
        // lock was taken and found nothing to remove.
        if std::fs::symlink_metadata(&full_path).is_err() {
            continue;
        }
        // Drains may already have added the name.
        state.insert(entry);
    }
}
