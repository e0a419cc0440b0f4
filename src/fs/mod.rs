//! Managed file streams.
//!
//! A [`ManagedFile`] flushes staged writes and releases its handle exactly
//! once, whether the owner calls [`ManagedFile::close`] or simply drops it.
//!
//! # Example
//!
//! ```no_run
//! use managed_fs::fs::ManagedFile;
//!
//! # fn main() -> managed_fs::Result<()> {
//! let mut file = ManagedFile::create("test.bin")?;
//! file.write(b"hello")?;
//! file.close()?;
//!
//! // Dropping without close() still flushes, but errors are only logged.
//! let mut file = ManagedFile::create("other.bin")?;
//! file.write(b"world")?;
//! drop(file);
//! # Ok(())
//! # }
//! ```

mod cleanup;
mod handle;
mod managed;
mod open_options;
mod strategy;

pub use cleanup::{CleanupHook, CleanupKind, FnHook, NoopHook};
pub use handle::{Access, FileHandle};
pub use managed::{FileId, LifecycleState, ManagedFile};
pub use open_options::OpenOptions;
pub use strategy::{BufferedStrategy, DirectStrategy, FileStrategy, StrategyProbe};

pub(crate) use managed::Finalizer;
