//! Background finalization of dropped streams.
//!
//! A [`ManagedFile`](crate::fs::ManagedFile) dropped without a successful
//! `close()` needs its implicit release sequence run somewhere. By default
//! that happens inline in `Drop`. Streams opened with
//! [`OpenOptions::reclaimer`](crate::fs::OpenOptions::reclaimer) instead hand
//! their finalizer to a [`Reclaimer`], which runs it on its own thread at an
//! unspecified later time.
//!
//! [`Reclaimer::collect`] blocks until every queued finalizer has run, which
//! makes the deferred path deterministic enough to test.
//!
//! Finalization is best-effort: it does not run for streams passed to
//! `std::mem::forget` or on abrupt process exit. Streams whose reclaimer has
//! shut down fall back to inline finalization.

use crate::error::{Error, Result};
use crate::fs::Finalizer;
use crate::tracing_compat::{debug, error, info};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration options for a reclaimer.
#[derive(Debug, Clone)]
pub struct ReclaimerOptions {
    /// Name of the finalizer thread.
    pub thread_name: String,
}

impl Default for ReclaimerOptions {
    fn default() -> Self {
        Self {
            thread_name: "managed-fs-reclaimer".to_string(),
        }
    }
}

/// Counters describing reclaimer activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Finalizers accepted onto the queue.
    pub enqueued: u64,
    /// Finalizers that finished running.
    pub finalized: u64,
    /// Finalizers that panicked outside the hook guard.
    pub panicked: u64,
}

struct ReclaimerInner {
    queue: SegQueue<Finalizer>,
    /// Enqueued and not yet finished.
    pending: AtomicUsize,
    shutdown: AtomicBool,
    mutex: Mutex<()>,
    /// Wakes the worker.
    work: Condvar,
    /// Wakes `collect()` callers.
    idle: Condvar,
    enqueued: AtomicU64,
    finalized: AtomicU64,
    panicked: AtomicU64,
}

/// Owner of the finalizer thread.
///
/// Dropping it stops accepting work, drains the queue and joins the thread.
pub struct Reclaimer {
    inner: Arc<ReclaimerInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

/// Cloneable, non-owning handle used by streams to submit finalizers.
#[derive(Clone)]
pub struct ReclaimHandle {
    inner: Weak<ReclaimerInner>,
}

impl Reclaimer {
    /// Starts a reclaimer with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(ReclaimerOptions::default())
    }

    /// Starts a reclaimer with the given options.
    pub fn with_options(options: ReclaimerOptions) -> Result<Self> {
        let inner = Arc::new(ReclaimerInner {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            work: Condvar::new(),
            idle: Condvar::new(),
            enqueued: AtomicU64::new(0),
            finalized: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let worker = Arc::clone(&inner);
        let thread = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || reclaim_worker_loop(&worker))
            .map_err(|e| Error::from_io(e).with_message("failed to spawn reclaimer thread"))?;

        info!(thread = %options.thread_name, "reclaimer started");
        Ok(Self {
            inner,
            thread: Mutex::new(Some(thread)),
            thread_name: options.thread_name,
        })
    }

    /// Returns a handle for [`OpenOptions::reclaimer`](crate::fs::OpenOptions::reclaimer).
    #[must_use]
    pub fn handle(&self) -> ReclaimHandle {
        ReclaimHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Blocks until every queued finalizer has run.
    ///
    /// Must not be called from a cleanup hook running on the reclaimer thread.
    pub fn collect(&self) {
        let mut guard = self.inner.mutex.lock();
        while self.inner.pending.load(Ordering::Acquire) > 0 {
            self.inner.idle.wait(&mut guard);
        }
    }

    /// Like [`collect`](Self::collect) but gives up after `timeout`.
    ///
    /// Returns `true` if the queue drained in time.
    pub fn collect_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.collect();
            return true;
        };
        let mut guard = self.inner.mutex.lock();
        while self.inner.pending.load(Ordering::Acquire) > 0 {
            if self.inner.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.inner.pending.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    /// Number of finalizers queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Returns activity counters.
    #[must_use]
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            enqueued: self.inner.enqueued.load(Ordering::Acquire),
            finalized: self.inner.finalized.load(Ordering::Acquire),
            panicked: self.inner.panicked.load(Ordering::Acquire),
        }
    }

    /// Returns `true` once shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting finalizers, runs the ones already queued and joins the
    /// thread. Idempotent.
    pub fn shutdown(&self) {
        {
            let _guard = self.inner.mutex.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            self.inner.work.notify_all();
        }

        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Dropped from one of its own finalizers; the loop exits on its own.
            return;
        }
        if thread.join().is_err() {
            error!(thread = %self.thread_name, "reclaimer thread panicked");
        }
        info!(thread = %self.thread_name, "reclaimer stopped");
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaimer")
            .field("thread_name", &self.thread_name)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ReclaimHandle {
    /// Queues `finalizer`. Hands it back if the reclaimer is gone or shutting
    /// down, so the caller can run it inline.
    pub(crate) fn submit(&self, finalizer: Finalizer) -> std::result::Result<(), Finalizer> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(finalizer);
        };
        let _guard = inner.mutex.lock();
        if inner.shutdown.load(Ordering::Acquire) {
            return Err(finalizer);
        }
        debug!(file_id = %finalizer.file_id(), "finalizer queued");
        inner.pending.fetch_add(1, Ordering::AcqRel);
        inner.enqueued.fetch_add(1, Ordering::AcqRel);
        inner.queue.push(finalizer);
        inner.work.notify_one();
        Ok(())
    }

    /// Returns `true` while the reclaimer accepts finalizers.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| !inner.shutdown.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ReclaimHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

fn reclaim_worker_loop(inner: &ReclaimerInner) {
    loop {
        if let Some(finalizer) = inner.queue.pop() {
            run_finalizer(inner, finalizer);
            continue;
        }

        let mut guard = inner.mutex.lock();
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        inner.work.wait(&mut guard);
    }
}

fn run_finalizer(inner: &ReclaimerInner, finalizer: Finalizer) {
    let file_id = finalizer.file_id();
    if panic::catch_unwind(AssertUnwindSafe(|| finalizer.run())).is_err() {
        error!(file_id = %file_id, "finalizer panicked");
        inner.panicked.fetch_add(1, Ordering::AcqRel);
    }
    inner.finalized.fetch_add(1, Ordering::AcqRel);

    let _guard = inner.mutex.lock();
    inner.pending.fetch_sub(1, Ordering::AcqRel);
    inner.idle.notify_all();
}
