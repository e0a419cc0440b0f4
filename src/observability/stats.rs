//! Lifecycle counters for managed streams.
//!
//! Failures on the implicit path are never returned to anyone; these counters
//! are where they become visible. One [`LifecycleStats`] can be shared by any
//! number of streams.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared lifecycle counters.
#[derive(Debug, Default)]
pub struct LifecycleStats {
    explicit_cleanups: AtomicU64,
    implicit_cleanups: AtomicU64,
    flush_failures_reported: AtomicU64,
    flush_failures_suppressed: AtomicU64,
    handles_released: AtomicU64,
    handle_release_failures: AtomicU64,
    finalizers_suppressed: AtomicU64,
    hook_panics: AtomicU64,
}

/// Point-in-time copy of [`LifecycleStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    /// Release sequences run by `close()`.
    pub explicit_cleanups: u64,
    /// Release sequences run by finalization.
    pub implicit_cleanups: u64,
    /// Flush failures returned from `close()`.
    pub flush_failures_reported: u64,
    /// Flush failures swallowed during finalization.
    pub flush_failures_suppressed: u64,
    /// OS handles closed.
    pub handles_released: u64,
    /// Handle release failures (always swallowed).
    pub handle_release_failures: u64,
    /// Streams dropped after a successful `close()` (no finalization ran).
    pub finalizers_suppressed: u64,
    /// Cleanup hooks that panicked during finalization.
    pub hook_panics: u64,
}

impl LifecycleStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            explicit_cleanups: self.explicit_cleanups.load(Ordering::Acquire),
            implicit_cleanups: self.implicit_cleanups.load(Ordering::Acquire),
            flush_failures_reported: self.flush_failures_reported.load(Ordering::Acquire),
            flush_failures_suppressed: self.flush_failures_suppressed.load(Ordering::Acquire),
            handles_released: self.handles_released.load(Ordering::Acquire),
            handle_release_failures: self.handle_release_failures.load(Ordering::Acquire),
            finalizers_suppressed: self.finalizers_suppressed.load(Ordering::Acquire),
            hook_panics: self.hook_panics.load(Ordering::Acquire),
        }
    }

    pub(crate) fn record_cleanup(&self, explicit: bool) {
        if explicit {
            self.explicit_cleanups.fetch_add(1, Ordering::AcqRel);
        } else {
            self.implicit_cleanups.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn record_flush_failure(&self, suppressed: bool) {
        if suppressed {
            self.flush_failures_suppressed.fetch_add(1, Ordering::AcqRel);
        } else {
            self.flush_failures_reported.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn record_handle_release(&self, ok: bool) {
        if ok {
            self.handles_released.fetch_add(1, Ordering::AcqRel);
        } else {
            self.handle_release_failures.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn record_finalizer_suppressed(&self) {
        self.finalizers_suppressed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_hook_panic(&self) {
        self.hook_panics.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = LifecycleStats::new();
        stats.record_cleanup(true);
        stats.record_cleanup(false);
        stats.record_cleanup(false);
        stats.record_flush_failure(true);
        stats.record_handle_release(true);
        stats.record_handle_release(false);
        stats.record_finalizer_suppressed();

        let snap = stats.snapshot();
        assert_eq!(snap.explicit_cleanups, 1);
        assert_eq!(snap.implicit_cleanups, 2);
        assert_eq!(snap.flush_failures_suppressed, 1);
        assert_eq!(snap.flush_failures_reported, 0);
        assert_eq!(snap.handles_released, 1);
        assert_eq!(snap.handle_release_failures, 1);
        assert_eq!(snap.finalizers_suppressed, 1);
        assert_eq!(snap.hook_panics, 0);
    }

    #[test]
    fn snapshot_default_is_zero() {
        assert_eq!(LifecycleStats::new().snapshot(), LifecycleSnapshot::default());
    }
}
