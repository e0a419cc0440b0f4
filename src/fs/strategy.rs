//! I/O strategies used by [`ManagedFile`](super::ManagedFile).
//!
//! A strategy is the owned delegate that performs the actual writes. The
//! stream holds the only strong reference to it, so once the stream releases
//! it the strategy (and its staged bytes) is gone. [`StrategyProbe`] observes
//! that without keeping it alive.
//!
//! - [`DirectStrategy`]: every write goes straight to the handle.
//! - [`BufferedStrategy`]: writes are staged in a buffer and pushed to the
//!   handle when the buffer fills, on `flush`, or on release.

use super::handle::FileHandle;
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// The write path behind a managed stream.
pub trait FileStrategy: Send + fmt::Debug {
    /// Accepts `data` for writing.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Pushes any staged bytes to the handle.
    ///
    /// On failure the staged bytes are kept so a later flush can retry.
    fn flush(&mut self) -> Result<()>;

    /// Number of bytes accepted but not yet written to the handle.
    fn buffered_len(&self) -> usize;

    /// Drops staged bytes without writing them. Returns how many were dropped.
    fn discard_buffer(&mut self) -> usize;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Shared slot holding the stream's strategy.
pub(crate) type StrategyCell = Arc<Mutex<Box<dyn FileStrategy>>>;

/// Builds the strategy for `buffer_size` (0 selects the direct strategy).
pub(crate) fn new_strategy(handle: Arc<FileHandle>, buffer_size: usize) -> StrategyCell {
    let direct = DirectStrategy::new(handle);
    let strategy: Box<dyn FileStrategy> = if buffer_size == 0 {
        Box::new(direct)
    } else {
        Box::new(BufferedStrategy::with_capacity(buffer_size, direct))
    };
    Arc::new(Mutex::new(strategy))
}

/// Writes straight through to the handle.
#[derive(Debug)]
pub struct DirectStrategy {
    handle: Arc<FileHandle>,
}

impl DirectStrategy {
    /// Creates a direct strategy over `handle`.
    #[must_use]
    pub fn new(handle: Arc<FileHandle>) -> Self {
        Self { handle }
    }
}

impl FileStrategy for DirectStrategy {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.handle.write_all(data)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn buffered_len(&self) -> usize {
        0
    }

    fn discard_buffer(&mut self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Stages writes in a buffer in front of a [`DirectStrategy`].
///
/// Data is not written to the handle until:
/// - The buffer would overflow
/// - `flush()` is called
/// - A single write is at least as large as the buffer capacity
/// - The owning stream is released
#[derive(Debug)]
pub struct BufferedStrategy {
    inner: DirectStrategy,
    buf: Vec<u8>,
    capacity: usize,
}

impl BufferedStrategy {
    /// Creates a buffered strategy with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize, inner: DirectStrategy) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the staged bytes.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn flush_buf(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.inner.write(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

impl FileStrategy for BufferedStrategy {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > self.capacity {
            self.flush_buf()?;
        }
        if data.len() >= self.capacity {
            self.inner.write(data)
        } else {
            self.buf.extend_from_slice(data);
            Ok(())
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_buf()?;
        self.inner.flush()
    }

    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn discard_buffer(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }

    fn name(&self) -> &'static str {
        "buffered"
    }
}

/// Weak observer of a stream's strategy.
///
/// Holding a probe never keeps the strategy alive; it only reports whether
/// something else still does.
#[derive(Clone)]
pub struct StrategyProbe {
    weak: Weak<Mutex<Box<dyn FileStrategy>>>,
}

impl StrategyProbe {
    pub(crate) fn new(cell: &StrategyCell) -> Self {
        Self {
            weak: Arc::downgrade(cell),
        }
    }

    /// Returns true while the strategy has not been dropped.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.weak.strong_count() > 0
    }
}

impl fmt::Debug for StrategyProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyProbe")
            .field("alive", &self.is_alive())
            .finish()
    }
}
