// SPDX-License-Identifier: LGPL-3.0-only
#![allow(dead_code)]

use parking_lot::Mutex;
use spacefm_vfs::mime::MimeDatabase;
use spacefm_vfs::{
    Directory, DirectoryEvent, EventLoop, FileEntry, MimeTypeCache, Thumbnail, ThumbnailError, ThumbnailProvider,
    VfsConfig, VfsContext,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEBOUNCE_MS: u64 = 50;
pub const WAIT: Duration = Duration::from_secs(5);

/// Flattened notification, easy to compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Created(String),
    Deleted(Option<String>),
    Changed(Option<String>),
    Listed(bool),
    Thumbnail(String),
}

fn name_of(entry: &FileEntry) -> String {
    entry.name().to_string_lossy().into_owned()
}

impl From<&DirectoryEvent> for Seen {
    fn from(event: &DirectoryEvent) -> Self {
        match event {
            DirectoryEvent::FileCreated(e) => Seen::Created(name_of(e)),
            DirectoryEvent::FileDeleted(e) => Seen::Deleted(e.as_deref().map(name_of)),
            DirectoryEvent::FileChanged(e) => Seen::Changed(e.as_deref().map(name_of)),
            DirectoryEvent::FileListed { cancelled } => Seen::Listed(*cancelled),
            DirectoryEvent::ThumbnailLoaded(e) => Seen::Thumbnail(name_of(e)),
        }
    }
}

/// Collects every notification a directory emits.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn attach(dir: &Directory) -> Self {
        let recorder = Self::default();
        let events = recorder.events.clone();
        dir.subscribe(move |event| events.lock().push(event.into()));
        recorder
    }

    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().clone()
    }

    pub fn count(&self, wanted: &Seen) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }

    pub fn contains(&self, wanted: &Seen) -> bool {
        self.count(wanted) > 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Provider that "finds" a thumbnail for every file.
pub struct StubThumbnails;

impl ThumbnailProvider for StubThumbnails {
    fn load(&self, entry: &FileEntry, size: u32) -> Result<Thumbnail, ThumbnailError> {
        Ok(Thumbnail::new(entry.path().with_extension("thumbnail.png"), size))
    }
}

pub struct Harness {
    pub event_loop: EventLoop,
    pub context: VfsContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_change_prone(false)
    }

    pub fn with_change_prone(change_prone: bool) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let event_loop = EventLoop::new();
        let config = VfsConfig {
            debounce_ms: DEBOUNCE_MS,
            watch_mime_database: false,
            ..VfsConfig::default()
        };
        let context = VfsContext::builder(event_loop.handle())
            .config(config)
            .mime_cache(MimeTypeCache::with_source(|| MimeDatabase::new(Vec::new(), Vec::new())))
            .thumbnail_provider(Arc::new(StubThumbnails))
            .change_prone(move |_| change_prone)
            .build();

        Self { event_loop, context }
    }

    /// Pump until `recorder` saw `wanted`.
    pub fn wait_for(&self, recorder: &Recorder, wanted: Seen) -> bool {
        self.event_loop.run_until(WAIT, || recorder.contains(&wanted))
    }

    /// Pump for a few debounce windows so pending drains fire.
    pub fn settle(&self) {
        self.event_loop.run_for(Duration::from_millis(DEBOUNCE_MS * 4));
    }
}

/// Names of the entries a directory lists, dotfiles excluded.
pub fn visible_names(dir: &Directory) -> BTreeSet<String> {
    dir.files()
        .iter()
        .map(|f| name_of(f))
        .filter(|n| !n.starts_with('.'))
        .collect()
}

pub fn names<const N: usize>(names: [&str; N]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}
