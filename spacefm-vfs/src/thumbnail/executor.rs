// SPDX-License-Identifier: LGPL-3.0-only
//! Background queue feeding thumbnail requests to a provider.

use parking_lot::Mutex;
use smol::channel::{self, Sender};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::async_loader::AsyncLoader;
use crate::filesystem::entry::FileEntry;
use crate::filesystem::error::VfsResult;
use crate::thumbnail::ThumbnailProvider;

/// Task for thumbnail loading.
struct ThumbnailRequest {
    entry: Arc<FileEntry>,
    big: bool,
}

type PendingSet = Arc<Mutex<HashSet<(PathBuf, bool)>>>;

/// Edge lengths used for the two thumbnail slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSizes {
    pub small: u32,
    pub big: u32,
}

/// One worker thread draining a request queue.
///
/// Requests for an (entry, size) pair already waiting in the queue are
/// collapsed. `on_loaded` runs on the worker thread after the entry's slot
/// has been filled. Dropping the thumbnailer discards queued requests and
/// joins the worker.
pub struct Thumbnailer {
    tx: Sender<ThumbnailRequest>,
    pending: PendingSet,
    loader: AsyncLoader,
}

impl Thumbnailer {
    pub fn new<F>(provider: Arc<dyn ThumbnailProvider>, sizes: ThumbnailSizes, on_loaded: F) -> VfsResult<Self>
    where
        F: Fn(Arc<FileEntry>) + Send + 'static,
    {
        let (tx, rx) = channel::unbounded::<ThumbnailRequest>();
        let pending: PendingSet = Arc::new(Mutex::new(HashSet::new()));

        let worker_pending = pending.clone();
        let loader = AsyncLoader::new("thumbnailer", move |token| {
            while let Ok(request) = rx.recv_blocking() {
                if token.is_cancelled() {
                    break;
                }
                let ThumbnailRequest { entry, big } = request;
                worker_pending.lock().remove(&(entry.path().to_path_buf(), big));

                if entry.is_thumbnail_loaded(big) {
                    continue;
                }
                let size = if big { sizes.big } else { sizes.small };
                match provider.load(&entry, size) {
                    Ok(thumbnail) => {
                        entry.set_thumbnail(big, thumbnail);
                        on_loaded(entry);
                    },
                    Err(e) => log::debug!("No thumbnail for {:?}: {}", entry.path(), e),
                }
            }
        });
        loader.run()?;

        Ok(Self { tx, pending, loader })
    }

    /// Queue `entry`. Returns false if an identical request is already waiting.
    pub fn request(&self, entry: Arc<FileEntry>, big: bool) -> bool {
        if !self.pending.lock().insert((entry.path().to_path_buf(), big)) {
            return false;
        }
        if self.tx.try_send(ThumbnailRequest { entry, big }).is_err() {
            log::warn!("Thumbnail worker is gone, request dropped");
            return false;
        }
        true
    }

    /// Requests still waiting in the queue.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.loader.is_running()
    }
}

impl Drop for Thumbnailer {
    fn drop(&mut self) {
        self.loader.cancel();
        self.tx.close();
        self.pending.lock().clear();
    }
}

impl std::fmt::Debug for Thumbnailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnailer")
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}
