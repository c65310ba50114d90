// SPDX-License-Identifier: LGPL-3.0-only
//! Kernel watch on a single path.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::event_loop::LoopHandle;
use crate::filesystem::error::{VfsError, VfsResult};

/// Logical event delivered to a monitor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    /// New entry, or an entry renamed into the watched directory.
    Created,
    /// Removal, rename out of scope, deletion of the watched path itself.
    Deleted,
    /// Content or attribute modification.
    Changed,
    /// Anything else the backend reports. Forwarded, never dropped.
    Other,
}

/// Callback invoked on the event-loop thread for every dispatched event.
pub type MonitorCallback = Arc<dyn Fn(MonitorEvent, &Path) + Send + Sync + 'static>;

/// One kernel watch on one path, with a single callback.
///
/// Raw events are read by the backend thread and posted to the event loop;
/// the callback always runs on the thread pumping the [`crate::EventLoop`].
/// If the backend reports an error the monitor stops dispatching for good.
pub struct FileMonitor {
    path: PathBuf,
    real_path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    active: Arc<AtomicBool>,
}

impl FileMonitor {
    /// Install a watch on `path` and route its events to `callback`.
    ///
    /// Symlinks are resolved first since the kernel facility does not follow
    /// them. Fails if the path does not resolve or the watch cannot be added.
    pub fn create<F>(path: &Path, handle: LoopHandle, callback: F) -> VfsResult<Self>
    where
        F: Fn(MonitorEvent, &Path) + Send + Sync + 'static,
    {
        let real_path = path
            .canonicalize()
            .map_err(|_| VfsError::InvalidPath(path.to_path_buf()))?;

        let callback: MonitorCallback = Arc::new(callback);
        let active = Arc::new(AtomicBool::new(true));

        let handler = {
            let active = active.clone();
            let requested = path.to_path_buf();
            let real = real_path.clone();
            move |res: notify::Result<Event>| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                match res {
                    Ok(event) => {
                        for (kind, event_path) in classify(&event, &real) {
                            let event_path = rebase(&event_path, &real, &requested);
                            let callback = callback.clone();
                            let still_active = active.clone();
                            let posted = handle.invoke(move || {
                                if still_active.load(Ordering::SeqCst) {
                                    callback(kind, &event_path);
                                }
                            });
                            if posted.is_err() {
                                log::warn!("Event loop closed, monitor on {:?} stops dispatching", requested);
                                active.store(false, Ordering::SeqCst);
                                return;
                            }
                        }
                    },
                    Err(e) => {
                        log::error!("Disconnected from watch backend on {:?}: {}", requested, e);
                        active.store(false, Ordering::SeqCst);
                    },
                }
            }
        };

        let mut watcher = notify::recommended_watcher(handler)
            .map_err(|e| VfsError::from_watch(real_path.clone(), e))?;
        watcher
            .watch(&real_path, RecursiveMode::NonRecursive)
            .map_err(|e| VfsError::from_watch(real_path.clone(), e))?;

        log::debug!("FileMonitor: watching {:?} ({:?})", real_path, path);

        Ok(Self {
            path: path.to_path_buf(),
            real_path,
            watcher: Some(watcher),
            active,
        })
    }

    /// The path as requested by the owner.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The resolved path the kernel watch is installed on.
    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// Whether events are still being dispatched.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the kernel watch. Equivalent to dropping the monitor.
    pub fn remove(self) {}
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(mut watcher) = self.watcher.take() {
            // Fails when the watched path is already gone; the kernel dropped the watch itself.
            if let Err(e) = watcher.unwatch(&self.real_path) {
                log::debug!("FileMonitor: unwatch {:?}: {}", self.real_path, e);
            }
        }
    }
}

impl std::fmt::Debug for FileMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMonitor")
            .field("path", &self.path)
            .field("real_path", &self.real_path)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Map one backend event onto logical events, one per affected path.
///
/// Events without a path (queue overflow, rescan requests) are reported
/// against `watched`.
pub(crate) fn classify(event: &Event, watched: &Path) -> Vec<(MonitorEvent, PathBuf)> {
    let kind = match event.kind {
        EventKind::Create(_) => MonitorEvent::Created,
        EventKind::Remove(_) => MonitorEvent::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => MonitorEvent::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => MonitorEvent::Deleted,
        // The backend also reports both halves of a rename separately.
        EventKind::Modify(ModifyKind::Name(_)) => MonitorEvent::Other,
        EventKind::Modify(_) => MonitorEvent::Changed,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => MonitorEvent::Other,
    };

    if event.paths.is_empty() {
        return vec![(kind, watched.to_path_buf())];
    }
    event.paths.iter().map(|p| (kind, p.clone())).collect()
}

/// Express a backend path relative to the path the owner asked for.
fn rebase(event_path: &Path, real: &Path, requested: &Path) -> PathBuf {
    match event_path.strip_prefix(real) {
        Ok(rest) if rest.as_os_str().is_empty() => requested.to_path_buf(),
        Ok(rest) => requested.join(rest),
        Err(_) => event_path.to_path_buf(),
    }
}
