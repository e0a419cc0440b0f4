//! managed-fs: file streams with deterministic close and drop-time finalization.
//!
//! # Overview
//!
//! A [`ManagedFile`] is a write stream over an OS file handle. Bytes written
//! to it may sit in a staging buffer until flushed. The stream can be
//! released two ways and both run the same sequence:
//!
//! - **Explicit**: [`ManagedFile::close`]. Flush failures are returned to the
//!   caller. Repeat calls re-invoke the cleanup hook but never release the
//!   handle twice.
//! - **Implicit**: dropping the stream without a successful `close()`. The
//!   release runs inline or on a [`Reclaimer`] thread and never raises; flush
//!   failures are logged and counted.
//!
//! # Guarantees
//!
//! - **Lossless**: staged bytes reach the handle before it is released, on
//!   either path, unless the flush itself fails
//! - **At-most-once release**: the OS handle is closed once, and only if the
//!   stream owns it
//! - **Suppressed finalization**: a successful `close()` means drop does
//!   nothing further
//! - **Collectible strategy**: after release the stream drops its write
//!   strategy, observable through [`fs::StrategyProbe`]
//!
//! # Module Structure
//!
//! - [`fs`]: the managed stream, handle model, strategies and cleanup hooks
//! - [`reclaim`]: background finalizer thread with a forced-collection trigger
//! - [`config`]: stream configuration from code, environment or TOML
//! - [`observability`]: lifecycle counters
//! - [`error`]: error types
//! - [`test_utils`]: logging and recording helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod error;
pub mod fs;
pub mod observability;
pub mod reclaim;
pub mod test_utils;
pub mod tracing_compat;

// Re-exports for convenient access to core types
pub use config::{ConfigError, ReflushPolicy, StreamConfig};
pub use error::{Error, ErrorCategory, ErrorKind, Result, ResultExt};
pub use fs::{CleanupHook, CleanupKind, FileHandle, ManagedFile, OpenOptions};
pub use observability::{LifecycleSnapshot, LifecycleStats};
pub use reclaim::{ReclaimHandle, ReclaimStats, Reclaimer, ReclaimerOptions};
