//! Tracing compatibility layer for structured logging.
//!
//! - **With `tracing-integration`** (default): re-exports from the `tracing` crate.
//! - **Without it**: no-op macros that compile to nothing.
//!
//! ```rust,ignore
//! use managed_fs::tracing_compat::{debug, warn};
//!
//! debug!(file_id = %id, "release sequence started");
//! warn!(error = %err, "flush failure suppressed during finalization");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn, Level};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

/// No-op level type for when tracing is disabled.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Level;

#[cfg(not(feature = "tracing-integration"))]
impl Level {
    /// Trace level (most verbose).
    pub const TRACE: Self = Self;
    /// Debug level.
    pub const DEBUG: Self = Self;
    /// Info level.
    pub const INFO: Self = Self;
    /// Warn level.
    pub const WARN: Self = Self;
    /// Error level (least verbose).
    pub const ERROR: Self = Self;
}
