//! Cleanup hook invoked by every release path.

use std::fmt;

/// Which path triggered a release sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupKind {
    /// The owner called `close()`.
    Explicit,
    /// The stream was dropped without a successful `close()`.
    Implicit,
}

impl CleanupKind {
    /// Returns true for the owner-driven path.
    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit)
    }

    /// Returns true for the drop-driven path.
    #[must_use]
    pub const fn is_implicit(&self) -> bool {
        matches!(self, Self::Implicit)
    }

    /// Returns a short label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
        }
    }
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied extension point run at the start of every release sequence.
///
/// It is called on each explicit `close()` (including repeats) and on the
/// implicit path. Implicit calls may happen on a reclaimer thread, so
/// implementations must not depend on the caller's thread. A panic on the
/// implicit path is caught and counted; it never unwinds out of `Drop`.
pub trait CleanupHook: Send + Sync {
    /// Called with the path that triggered the release.
    fn on_cleanup(&self, kind: CleanupKind);
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl CleanupHook for NoopHook {
    fn on_cleanup(&self, _kind: CleanupKind) {}
}

/// Adapts a closure into a [`CleanupHook`].
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(CleanupKind) + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> CleanupHook for FnHook<F>
where
    F: Fn(CleanupKind) + Send + Sync,
{
    fn on_cleanup(&self, kind: CleanupKind) {
        (self.0)(kind);
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHook")
    }
}
