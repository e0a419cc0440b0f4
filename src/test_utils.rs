//! Test utilities for managed-fs.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A recording cleanup hook for observing release paths
//!
//! # Example
//! ```
//! use managed_fs::test_utils::{init_test_logging, RecordingHook};
//!
//! init_test_logging();
//! let hook = RecordingHook::new();
//! assert_eq!(hook.calls(), 0);
//! ```

use crate::fs::{CleanupHook, CleanupKind};
use crate::tracing_compat::Level;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops. Without the
/// `tracing-integration` feature nothing is installed.
pub fn init_test_logging_with_level(level: Level) {
    INIT_LOGGING.call_once(|| install_subscriber(level));
}

#[cfg(feature = "tracing-integration")]
fn install_subscriber(level: Level) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .try_init();
}

#[cfg(not(feature = "tracing-integration"))]
fn install_subscriber(_level: Level) {}

/// Acquire the global environment lock for tests that mutate env vars.
pub fn env_lock() -> parking_lot::MutexGuard<'static, ()> {
    ENV_LOCK.lock()
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(phase = %$name, "{}", "=".repeat(40));
        $crate::tracing_compat::info!(phase = %$name, "TEST PHASE: {}", $name);
        $crate::tracing_compat::info!(phase = %$name, "{}", "=".repeat(40));
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::tracing_compat::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(
            test = %$name,
            "test completed successfully: {}",
            $name
        );
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::tracing_compat::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        $crate::tracing_compat::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Cleanup hook that records every invocation and the thread it ran on.
///
/// Clones share the same record, so a test keeps one clone and hands the
/// other to the stream.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    inner: Arc<RecordingInner>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    kinds: Mutex<Vec<CleanupKind>>,
    threads: Mutex<Vec<Option<String>>>,
    panic_on_explicit: AtomicBool,
    panic_on_implicit: AtomicBool,
}

impl RecordingHook {
    /// Creates an empty recording hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hook that panics when invoked on the implicit path.
    #[must_use]
    pub fn panicking_on_implicit() -> Self {
        let hook = Self::default();
        hook.inner.panic_on_implicit.store(true, Ordering::SeqCst);
        hook
    }

    /// Creates a hook that panics when invoked by `close()`.
    #[must_use]
    pub fn panicking_on_explicit() -> Self {
        let hook = Self::default();
        hook.inner.panic_on_explicit.store(true, Ordering::SeqCst);
        hook
    }

    /// Returns the hook as a shareable trait object.
    #[must_use]
    pub fn as_hook(&self) -> Arc<dyn CleanupHook> {
        Arc::new(self.clone())
    }

    /// Returns every recorded cleanup kind in call order.
    #[must_use]
    pub fn kinds(&self) -> Vec<CleanupKind> {
        self.inner.kinds.lock().clone()
    }

    /// Returns the total number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.kinds.lock().len()
    }

    /// Returns the number of explicit invocations.
    #[must_use]
    pub fn explicit_calls(&self) -> usize {
        self.count(CleanupKind::Explicit)
    }

    /// Returns the number of implicit invocations.
    #[must_use]
    pub fn implicit_calls(&self) -> usize {
        self.count(CleanupKind::Implicit)
    }

    /// Returns the thread names the hook ran on, in call order.
    #[must_use]
    pub fn thread_names(&self) -> Vec<Option<String>> {
        self.inner.threads.lock().clone()
    }

    fn count(&self, kind: CleanupKind) -> usize {
        self.inner.kinds.lock().iter().filter(|k| **k == kind).count()
    }
}

impl CleanupHook for RecordingHook {
    fn on_cleanup(&self, kind: CleanupKind) {
        self.inner.kinds.lock().push(kind);
        self.inner
            .threads
            .lock()
            .push(std::thread::current().name().map(str::to_owned));
        let panics = match kind {
            CleanupKind::Explicit => self.inner.panic_on_explicit.load(Ordering::SeqCst),
            CleanupKind::Implicit => self.inner.panic_on_implicit.load(Ordering::SeqCst),
        };
        assert!(!panics, "recording hook configured to panic on {kind} cleanup");
    }
}
