//! The managed stream and its release sequence.
//!
//! [`ManagedFile`] owns a [`FileHandle`] and a write strategy. It has two
//! cleanup paths that run the same release sequence:
//!
//! - `close()`: explicit, callable any number of times, reports flush
//!   failures to the caller.
//! - `Drop` without a successful `close()`: implicit finalization, run inline
//!   or on an attached [`Reclaimer`](crate::reclaim::Reclaimer) thread. It
//!   never raises; flush failures are logged and counted.
//!
//! # Release sequence
//!
//! 1. Invoke the cleanup hook with the triggering [`CleanupKind`]
//! 2. Flush staged bytes through the strategy
//! 3. Release the handle if owned and not yet released, even if (2) failed
//! 4. Drop the strategy once nothing remains staged
//! 5. Report the flush failure (explicit) or swallow it (implicit)
//!
//! # States
//!
//! ```text
//! Open ──close()/drop──▶ Disposing ──▶ Disposed
//! ```
//!
//! The transition out of `Open` is a compare-exchange; a second attempt sees
//! the stream as already disposed and runs as a repeat call.

use super::cleanup::{CleanupHook, CleanupKind};
use super::handle::FileHandle;
use super::open_options::OpenOptions;
use super::strategy::{new_strategy, StrategyCell, StrategyProbe};
use crate::config::{ReflushPolicy, StreamConfig};
use crate::error::{Error, Result};
use crate::observability::LifecycleStats;
use crate::reclaim::ReclaimHandle;
use crate::tracing_compat::{debug, error, trace, warn};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a managed stream, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file-{}", self.0)
    }
}

/// Lifecycle state of a [`ManagedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting writes.
    Open,
    /// A release sequence is running.
    Disposing,
    /// Released. Only `close()` (hook re-invocation) is meaningful.
    Disposed,
}

const OPEN: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// Monotonic disposed gate shared by the stream and its finalizer.
#[derive(Debug, Default)]
pub(crate) struct LifecycleGate {
    state: AtomicU8,
    finalize_suppressed: AtomicBool,
}

impl LifecycleGate {
    fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            OPEN => LifecycleState::Open,
            DISPOSING => LifecycleState::Disposing,
            _ => LifecycleState::Disposed,
        }
    }

    /// Moves `Open → Disposing`. Returns false if already past `Open`.
    fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(OPEN, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(DISPOSED, Ordering::Release);
    }

    fn suppress_finalize(&self) {
        self.finalize_suppressed.store(true, Ordering::Release);
    }

    fn is_finalize_suppressed(&self) -> bool {
        self.finalize_suppressed.load(Ordering::Acquire)
    }
}

/// Everything the release sequence touches.
///
/// On drop the stream detaches a copy of this into a [`Finalizer`], so the
/// explicit and implicit paths share one implementation.
struct ReleaseState {
    id: FileId,
    gate: Arc<LifecycleGate>,
    handle: Arc<FileHandle>,
    strategy: Option<StrategyCell>,
    owns_handle: bool,
    handle_released: bool,
    hook: Arc<dyn CleanupHook>,
    config: StreamConfig,
    stats: Option<Arc<LifecycleStats>>,
}

impl ReleaseState {
    fn cleanup(&mut self, kind: CleanupKind) -> Result<()> {
        debug!(
            file_id = %self.id,
            kind = %kind,
            staged = self.buffered_len(),
            "release sequence started"
        );
        if let Some(stats) = &self.stats {
            stats.record_cleanup(kind.is_explicit());
        }

        self.invoke_hook(kind);
        let flushed = self.flush_staged();
        self.release_handle();
        let result = self.settle(kind, flushed);

        debug!(
            file_id = %self.id,
            kind = %kind,
            ok = result.is_ok(),
            "release sequence finished"
        );
        result
    }

    fn invoke_hook(&self, kind: CleanupKind) {
        if kind.is_explicit() {
            self.hook.on_cleanup(kind);
            return;
        }
        let hook = &self.hook;
        if panic::catch_unwind(AssertUnwindSafe(|| hook.on_cleanup(kind))).is_err() {
            error!(file_id = %self.id, "cleanup hook panicked during finalization");
            if let Some(stats) = &self.stats {
                stats.record_hook_panic();
            }
        }
    }

    fn flush_staged(&self) -> Result<()> {
        match &self.strategy {
            Some(cell) => cell.lock().flush(),
            None => Ok(()),
        }
    }

    fn release_handle(&mut self) {
        if self.handle_released {
            return;
        }
        self.handle_released = true;
        if !self.owns_handle {
            trace!(file_id = %self.id, "handle not owned, detaching without close");
            return;
        }
        match self.handle.release() {
            Ok(()) => {
                if let Some(stats) = &self.stats {
                    stats.record_handle_release(true);
                }
            }
            Err(err) => {
                warn!(file_id = %self.id, error = %err, "handle release failed");
                if let Some(stats) = &self.stats {
                    stats.record_handle_release(false);
                }
            }
        }
    }

    fn settle(&mut self, kind: CleanupKind, flushed: Result<()>) -> Result<()> {
        let Err(err) = flushed else {
            self.strategy = None;
            return Ok(());
        };

        if kind.is_implicit() {
            let lost = self.discard_strategy();
            warn!(
                file_id = %self.id,
                error = %err,
                lost_bytes = lost,
                "flush failure suppressed during finalization"
            );
            if let Some(stats) = &self.stats {
                stats.record_flush_failure(true);
            }
            return Ok(());
        }

        if let Some(stats) = &self.stats {
            stats.record_flush_failure(false);
        }
        match self.config.reflush {
            ReflushPolicy::Retry => {
                debug!(
                    file_id = %self.id,
                    staged = self.buffered_len(),
                    "flush failed on close, keeping staged bytes for retry"
                );
            }
            ReflushPolicy::HookOnly => {
                let lost = self.discard_strategy();
                debug!(
                    file_id = %self.id,
                    lost_bytes = lost,
                    "flush failed on close, staged bytes discarded"
                );
            }
        }
        Err(err)
    }

    fn discard_strategy(&mut self) -> usize {
        self.strategy
            .take()
            .map_or(0, |cell| cell.lock().discard_buffer())
    }

    fn buffered_len(&self) -> usize {
        self.strategy
            .as_ref()
            .map_or(0, |cell| cell.lock().buffered_len())
    }

    /// Moves the releasable parts out, leaving this state inert.
    fn detach(&mut self) -> Self {
        Self {
            id: self.id,
            gate: Arc::clone(&self.gate),
            handle: Arc::clone(&self.handle),
            strategy: self.strategy.take(),
            owns_handle: self.owns_handle,
            handle_released: std::mem::replace(&mut self.handle_released, true),
            hook: Arc::clone(&self.hook),
            config: self.config,
            stats: self.stats.clone(),
        }
    }
}

/// Pending implicit cleanup of a dropped stream.
pub(crate) struct Finalizer {
    state: ReleaseState,
}

impl Finalizer {
    pub(crate) fn file_id(&self) -> FileId {
        self.state.id
    }

    /// Runs the implicit release sequence. Never panics through a hook and
    /// never returns an error.
    pub(crate) fn run(mut self) {
        if self.state.gate.is_finalize_suppressed() {
            trace!(file_id = %self.state.id, "finalizer suppressed");
            return;
        }
        let _ = self.state.gate.try_begin();
        let _ = self.state.cleanup(CleanupKind::Implicit);
        self.state.gate.finish();
    }
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer")
            .field("file_id", &self.state.id)
            .finish()
    }
}

/// A file-backed write stream with explicit and implicit release.
///
/// # Example
///
/// ```no_run
/// use managed_fs::fs::ManagedFile;
///
/// # fn main() -> managed_fs::Result<()> {
/// let mut file = ManagedFile::create("out.bin")?;
/// file.write(b"hello")?;
/// file.close()?; // flushes, then closes the handle
/// # Ok(())
/// # }
/// ```
pub struct ManagedFile {
    state: ReleaseState,
    reclaimer: Option<ReclaimHandle>,
}

impl ManagedFile {
    /// Returns a new [`OpenOptions`] builder.
    #[must_use]
    pub fn options() -> OpenOptions {
        OpenOptions::new()
    }

    /// Creates (or truncates) `path` for writing with default settings.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    /// Opens `path` read-only. Staged writes will fail to flush.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        OpenOptions::new().read(true).open(path)
    }

    /// Wraps an existing handle with default settings.
    ///
    /// With `owns_handle == false` closing the stream flushes through the
    /// handle but leaves it open for the caller.
    #[must_use]
    pub fn from_handle(handle: Arc<FileHandle>, owns_handle: bool) -> Self {
        OpenOptions::new().wrap(handle, owns_handle)
    }

    pub(crate) fn from_parts(
        handle: Arc<FileHandle>,
        owns_handle: bool,
        config: StreamConfig,
        hook: Arc<dyn CleanupHook>,
        stats: Option<Arc<LifecycleStats>>,
        reclaimer: Option<ReclaimHandle>,
    ) -> Self {
        let id = FileId::next();
        let strategy = new_strategy(Arc::clone(&handle), config.buffer_size);
        debug!(
            file_id = %id,
            path = ?handle.path(),
            owns_handle,
            buffer_size = config.buffer_size,
            reflush = %config.reflush,
            "managed file opened"
        );
        Self {
            state: ReleaseState {
                id,
                gate: Arc::new(LifecycleGate::default()),
                handle,
                strategy: Some(strategy),
                owns_handle,
                handle_released: false,
                hook,
                config,
                stats,
            },
            reclaimer,
        }
    }

    /// Returns the stream id.
    #[must_use]
    pub fn id(&self) -> FileId {
        self.state.id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.gate.state()
    }

    /// Returns true once a release sequence has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() != LifecycleState::Open
    }

    /// Returns true if closing the stream closes the OS handle.
    #[must_use]
    pub fn owns_handle(&self) -> bool {
        self.state.owns_handle
    }

    /// Returns the underlying handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<FileHandle> {
        &self.state.handle
    }

    /// Returns the stream configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.state.config
    }

    /// Number of bytes accepted but not yet written to the handle.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.state.buffered_len()
    }

    /// Returns a weak probe of the write strategy, or `None` once it has been
    /// released.
    #[must_use]
    pub fn strategy_probe(&self) -> Option<StrategyProbe> {
        self.state.strategy.as_ref().map(StrategyProbe::new)
    }

    /// Writes `data` through the strategy.
    ///
    /// Fails with `AlreadyClosed` after release. Unbuffered streams over a
    /// read-only handle fail here with `AccessDenied`; buffered ones stage
    /// the bytes and fail on flush.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let cell = self.open_strategy()?;
        cell.lock().write(data)
    }

    /// Pushes staged bytes to the handle now.
    pub fn flush(&mut self) -> Result<()> {
        let cell = self.open_strategy()?;
        cell.lock().flush()
    }

    /// Explicit release.
    ///
    /// The first call flushes, releases the handle and, on success, suppresses
    /// finalization. Every call, including repeats, invokes the cleanup hook
    /// with [`CleanupKind::Explicit`]. The handle is released at most once.
    ///
    /// A flush failure is returned to the caller. With
    /// [`ReflushPolicy::Retry`] the bytes stay staged and each later call
    /// retries and fails again; with [`ReflushPolicy::HookOnly`] they are
    /// discarded and later calls succeed.
    pub fn close(&mut self) -> Result<()> {
        if !self.state.gate.try_begin() {
            trace!(file_id = %self.state.id, "repeat close");
        }
        let result = self.state.cleanup(CleanupKind::Explicit);
        self.state.gate.finish();
        if result.is_ok() {
            self.state.gate.suppress_finalize();
        }
        result
    }

    fn open_strategy(&self) -> Result<&StrategyCell> {
        if self.state.gate.state() != LifecycleState::Open {
            return Err(Error::already_closed(format!("{} released", self.state.id)));
        }
        self.state
            .strategy
            .as_ref()
            .ok_or_else(|| Error::internal("open stream without strategy"))
    }
}

impl Drop for ManagedFile {
    fn drop(&mut self) {
        if self.state.gate.is_finalize_suppressed() {
            trace!(file_id = %self.state.id, "dropped after close, finalization suppressed");
            if let Some(stats) = &self.state.stats {
                stats.record_finalizer_suppressed();
            }
            return;
        }

        let finalizer = Finalizer {
            state: self.state.detach(),
        };
        let finalizer = match &self.reclaimer {
            Some(reclaimer) => match reclaimer.submit(finalizer) {
                Ok(()) => return,
                Err(finalizer) => finalizer,
            },
            None => finalizer,
        };
        finalizer.run();
    }
}

impl fmt::Debug for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFile")
            .field("id", &self.state.id)
            .field("state", &self.state())
            .field("owns_handle", &self.state.owns_handle)
            .field("buffered", &self.buffered_len())
            .field("handle", &self.state.handle)
            .finish_non_exhaustive()
    }
}

impl io::Write for ManagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Self::flush(self).map_err(io::Error::from)
    }
}
