// SPDX-License-Identifier: LGPL-3.0-only
//! Single-threaded dispatcher that every monitor callback, coalescing drain
//! and subscriber notification runs on.
//!
//! Background threads (directory scans, thumbnail loading, the kernel watch
//! reader) never touch subscribers directly: they post closures through a
//! [`LoopHandle`] and whichever thread pumps the [`EventLoop`] executes them.

use futures::FutureExt;
use smol::channel::{self, Receiver, Sender};
use smol::Timer;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::filesystem::error::{VfsError, VfsResult};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Messages accepted by the loop.
enum LoopMessage {
    /// Run as soon as the loop is pumped.
    Invoke(Callback),
    /// Run once `at` has passed.
    Deadline { at: Instant, callback: Callback },
}

/// A timer waiting in the heap. Ordered so the earliest deadline pops first,
/// ties broken by submission order.
struct PendingTimer {
    at: Instant,
    seq: u64,
    callback: Callback,
}

impl PartialEq for PendingTimer {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for PendingTimer {}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cloneable, thread-safe handle used to post work onto an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    tx: Sender<LoopMessage>,
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl LoopHandle {
    /// Queue `f` to run on the loop thread at the next iteration.
    pub fn invoke<F>(&self, f: F) -> VfsResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .try_send(LoopMessage::Invoke(Box::new(f)))
            .map_err(|_| VfsError::LoopClosed)
    }

    /// Queue `f` to run on the loop thread once `delay` has elapsed.
    pub fn invoke_after<F>(&self, delay: Duration, f: F) -> VfsResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .try_send(LoopMessage::Deadline {
                at: Instant::now() + delay,
                callback: Box::new(f),
            })
            .map_err(|_| VfsError::LoopClosed)
    }

    /// Whether the receiving [`EventLoop`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The receiving end. Not `Sync`: it is pumped by exactly one thread.
pub struct EventLoop {
    handle: LoopHandle,
    rx: Receiver<LoopMessage>,
    timers: RefCell<BinaryHeap<PendingTimer>>,
    next_seq: Cell<u64>,
}

impl EventLoop {
    /// Create a new loop with no pending work.
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            handle: LoopHandle { tx },
            rx,
            timers: RefCell::new(BinaryHeap::new()),
            next_seq: Cell::new(0),
        }
    }

    /// Handle for posting work from any thread.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Number of armed timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Run everything that is ready. If nothing is ready, wait up to
    /// `max_wait` for a message or a timer and run that.
    ///
    /// Returns the number of callbacks executed.
    pub fn iterate(&self, max_wait: Duration) -> usize {
        let give_up = Instant::now() + max_wait;

        smol::block_on(async {
            loop {
                let mut dispatched = self.drain_messages();
                dispatched += self.fire_due_timers();
                if dispatched > 0 {
                    return dispatched;
                }

                let now = Instant::now();
                if now >= give_up {
                    return 0;
                }

                let wake_at = self.next_deadline().map_or(give_up, |at| at.min(give_up));
                let recv = self.rx.recv().fuse();
                let timer = Timer::at(wake_at).fuse();
                futures::pin_mut!(recv);
                futures::pin_mut!(timer);

                futures::select! {
                    msg = recv => match msg {
                        Ok(msg) => {
                            if self.accept(msg) {
                                return 1;
                            }
                        },
                        // Every handle is gone; only armed timers remain.
                        Err(_) if self.next_deadline().is_none() => return 0,
                        Err(_) => {},
                    },
                    _ = timer => {},
                }
            }
        })
    }

    /// Pump the loop until `duration` has elapsed.
    pub fn run_for(&self, duration: Duration) {
        let end = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= end {
                return;
            }
            self.iterate(end - now);
        }
    }

    /// Pump the loop until `done` returns true or `timeout` elapses.
    ///
    /// Returns whether the predicate was satisfied.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let end = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= end {
                return false;
            }
            self.iterate(end - now);
        }
    }

    fn drain_messages(&self) -> usize {
        let mut dispatched = 0;
        while let Ok(msg) = self.rx.try_recv() {
            if self.accept(msg) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Run an immediate callback, or park a deadline in the heap.
    fn accept(&self, msg: LoopMessage) -> bool {
        match msg {
            LoopMessage::Invoke(callback) => {
                callback();
                true
            },
            LoopMessage::Deadline { at, callback } => {
                let seq = self.next_seq.get();
                self.next_seq.set(seq + 1);
                self.timers
                    .borrow_mut()
                    .push(PendingTimer { at, seq, callback });
                false
            },
        }
    }

    fn fire_due_timers(&self) -> usize {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut timers = self.timers.borrow_mut();
            while timers.peek().is_some_and(|t| t.at <= now) {
                if let Some(timer) = timers.pop() {
                    due.push(timer);
                }
            }
        }

        let count = due.len();
        for timer in due {
            (timer.callback)();
        }
        count
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().peek().map(|t| t.at)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("queued", &self.rx.len())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}
