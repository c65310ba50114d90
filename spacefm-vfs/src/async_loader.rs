// SPDX-License-Identifier: LGPL-3.0-only
//! One-shot background thread task used for directory scans and thumbnail queues.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::filesystem::error::{VfsError, VfsResult};

/// Cooperative cancellation flag shared between an [`AsyncLoader`] and its task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Task = Box<dyn FnOnce(&CancelToken) + Send + 'static>;
type FinishHandler = Box<dyn FnOnce(bool) + Send + 'static>;

/// Runs a single callable on a dedicated thread.
///
/// `run()` never blocks. The finish handlers are invoked with the cancelled
/// flag by [`AsyncLoader::join`], on the thread that calls it; marshaling that
/// back to the event loop is the owner's job. Dropping the loader cancels and
/// joins the thread without invoking the handlers.
pub struct AsyncLoader {
    name: &'static str,
    task: Mutex<Option<Task>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    token: CancelToken,
    running: Arc<AtomicBool>,
    finished: AtomicBool,
    on_finish: Mutex<Vec<FinishHandler>>,
}

impl AsyncLoader {
    /// Wrap `task`. Nothing runs until [`AsyncLoader::run`].
    pub fn new<F>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        Self {
            name,
            task: Mutex::new(Some(Box::new(task))),
            thread: Mutex::new(None),
            token: CancelToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            finished: AtomicBool::new(false),
            on_finish: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for the finish event.
    pub fn add_finish_handler<F>(&self, handler: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.on_finish.lock().push(Box::new(handler));
    }

    /// Start the task on a new thread. A second call is a no-op.
    pub fn run(&self) -> VfsResult<()> {
        let Some(task) = self.task.lock().take() else {
            return Ok(());
        };

        let token = self.token.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let spawned = std::thread::Builder::new()
            .name(format!("vfs-{}", self.name))
            .spawn(move || {
                task(&token);
                running.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            },
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                Err(VfsError::ThreadSpawn {
                    name: self.name,
                    source,
                })
            },
        }
    }

    /// Request early termination. Does not join.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the thread exits, then fire the finish handlers.
    ///
    /// Returns the cancelled flag, or `None` if there was no thread to join
    /// (never started, or already joined).
    pub fn join(&self) -> Option<bool> {
        let handle = self.thread.lock().take()?;
        if handle.join().is_err() {
            log::error!("{} thread panicked", self.name);
        }
        self.finished.store(true, Ordering::SeqCst);

        let cancelled = self.token.is_cancelled();
        let handlers = std::mem::take(&mut *self.on_finish.lock());
        for handler in handlers {
            handler(cancelled);
        }
        Some(cancelled)
    }

    /// Whether the task body is executing right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the thread has been joined.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token handed to the task.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.thread.get_mut().take() {
            if handle.join().is_err() {
                log::error!("{} thread panicked during teardown", self.name);
            }
        }
    }
}

impl std::fmt::Debug for AsyncLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLoader")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
