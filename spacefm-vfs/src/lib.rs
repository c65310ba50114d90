// SPDX-License-Identifier: LGPL-3.0-only
pub mod async_loader;
pub mod config;
pub mod context;
pub mod event_loop;
pub mod filesystem;
pub mod mime;
pub mod thumbnail;

pub use async_loader::{AsyncLoader, CancelToken};
pub use config::VfsConfig;
pub use context::{VfsContext, VfsContextBuilder};
pub use event_loop::{EventLoop, LoopHandle};
pub use filesystem::{
    ChangeProne, Directory, DirectoryCache, DirectoryEvent, FileEntry, FileMetadata, FileMonitor, FileType,
    MonitorEvent, SubscriptionId, VfsError, VfsResult,
};
pub use crate::mime::{MimeType, MimeTypeCache};
pub use thumbnail::{FreedesktopThumbnails, Thumbnail, ThumbnailError, ThumbnailProvider};
