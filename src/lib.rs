// SPDX-License-Identifier: LGPL-3.0-only
#![warn(missing_docs)]

//! Live directory listings, kernel watches and MIME types for SpaceFM.

pub use spacefm_vfs as vfs;

/// A "prelude" for users of the SpaceFM VFS layer.
///
/// ```rust
/// use spacefm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::vfs::{
        Directory, DirectoryEvent, EventLoop, FileEntry, LoopHandle, MimeTypeCache, SubscriptionId, VfsConfig,
        VfsContext, VfsError, VfsResult,
    };
}
