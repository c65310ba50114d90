// SPDX-License-Identifier: LGPL-3.0-only
//! Live directory listings backed by kernel watches.
//!
//! [`DirectoryCache`] hands out one shared [`Directory`] per canonical path.
//! Each directory scans itself on a background thread, then follows a
//! [`FileMonitor`] and reports created, changed and deleted entries.

pub mod cache;
pub mod directory;
pub mod entry;
pub mod error;
pub mod hidden;
pub mod monitor;
pub mod volume;

// Re-export public API
pub use cache::DirectoryCache;
pub use directory::{Directory, DirectoryEvent, DirectoryServices, SubscriptionId};
pub use entry::{DesktopInfo, FileEntry, FileMetadata, FileType};
pub use error::{VfsError, VfsResult};
pub use monitor::{FileMonitor, MonitorEvent};
pub use volume::ChangeProne;
