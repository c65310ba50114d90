// SPDX-License-Identifier: LGPL-3.0-only
//! Error types for the virtual filesystem layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by directory, monitor and loader setup.
///
/// Per-entry failures (a single `stat` failing during a scan or a re-stat)
/// never become a `VfsError`: they are skipped or reported as deletions.
#[derive(Error, Debug)]
pub enum VfsError {
    /// I/O error from std::fs operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the kernel watch backend (notify crate).
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The kernel refused another watch descriptor.
    #[error("Watch limit reached while watching {0:?}")]
    WatchLimit(PathBuf),

    /// The watch could not be installed on the path.
    #[error("Failed to watch {path:?}: {reason}")]
    Watch {
        /// Path that was to be watched.
        path: PathBuf,
        /// Backend diagnostic.
        reason: String,
    },

    /// A background thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        /// Thread name.
        name: &'static str,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// The path could not be resolved to a canonical form.
    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),

    /// Path is not a directory.
    #[error("Path is not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// The event loop receiving end has been dropped.
    #[error("Event loop closed")]
    LoopClosed,
}

/// Convenience alias used across the crate.
pub type VfsResult<T> = Result<T, VfsError>;

impl VfsError {
    /// Build the error for a failed watch installation, keeping the limit case distinct.
    pub(crate) fn from_watch(path: PathBuf, err: notify::Error) -> Self {
        match err.kind {
            notify::ErrorKind::MaxFilesWatch => VfsError::WatchLimit(path),
            notify::ErrorKind::Io(ref io) if io.raw_os_error() == Some(28) => {
                // ENOSPC from inotify_add_watch means max_user_watches is exhausted.
                VfsError::WatchLimit(path)
            },
            _ => VfsError::Watch {
                path,
                reason: err.to_string(),
            },
        }
    }
}
