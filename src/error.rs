//! Error types for managed file streams.
//!
//! Errors follow these rules:
//!
//! - Errors are explicit and typed; the [`ErrorKind`] is the thing callers match on
//! - Errors from an explicit `close()` propagate to its caller
//! - Errors from drop-time finalization never propagate; they are logged and counted
//! - Handle release failures are always contained
//!
//! # Error Categories
//!
//! - **Access**: the handle does not permit the attempted operation
//! - **Lifecycle**: the stream or its handle has already been released
//! - **Io**: any other failure reported by the operating system
//! - **Config**: invalid configuration values
//! - **Internal**: bugs and invalid states

use core::fmt;
use std::io;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Access ===
    /// Write or flush attempted on a handle not opened for writing.
    AccessDenied,

    // === Lifecycle ===
    /// Operation attempted after the stream or handle was released.
    AlreadyClosed,
    /// Closing the OS handle failed. Never surfaced by a release path.
    HandleReleaseFailure,

    // === Io ===
    /// Any other operating-system I/O failure.
    Io,

    // === Config ===
    /// Invalid configuration value.
    Config,

    // === Internal ===
    /// Internal error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AccessDenied => ErrorCategory::Access,
            Self::AlreadyClosed | Self::HandleReleaseFailure => ErrorCategory::Lifecycle,
            Self::Io => ErrorCategory::Io,
            Self::Config => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Maps this kind onto the closest [`io::ErrorKind`].
    #[must_use]
    pub fn to_io_kind(&self) -> io::ErrorKind {
        match self {
            Self::AccessDenied => io::ErrorKind::PermissionDenied,
            Self::AlreadyClosed => io::ErrorKind::BrokenPipe,
            Self::Config => io::ErrorKind::InvalidInput,
            Self::HandleReleaseFailure | Self::Io | Self::Internal => io::ErrorKind::Other,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Permission failures.
    Access,
    /// Release-lifecycle failures.
    Lifecycle,
    /// Operating-system failures.
    Io,
    /// Configuration failures.
    Config,
    /// Internal errors.
    Internal,
}

/// The main error type for managed file operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if the operation was refused for lack of write access.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self.kind, ErrorKind::AccessDenied)
    }

    /// Returns true if the stream or handle was already released.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadyClosed)
    }

    /// Creates an access-denied error.
    #[must_use]
    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied).with_message(detail)
    }

    /// Creates an already-closed error.
    #[must_use]
    pub fn already_closed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyClosed).with_message(detail)
    }

    /// Creates a handle release failure.
    #[must_use]
    pub fn handle_release(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandleReleaseFailure).with_message(detail)
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Classifies an operating-system error.
    ///
    /// `PermissionDenied` becomes [`ErrorKind::AccessDenied`]; everything else
    /// is [`ErrorKind::Io`]. The original error is kept as the source.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
            _ => ErrorKind::Io,
        };
        let message = err.to_string();
        Self::new(kind).with_message(message).with_source(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        Self::new(err.kind.to_io_kind(), err)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for managed file operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
