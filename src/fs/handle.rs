//! Shared, release-once OS file handle.
//!
//! A [`FileHandle`] wraps one `std::fs::File` together with the access mode it
//! was opened with. The OS file is closed by [`FileHandle::release`] exactly
//! once; every operation after that fails with `AlreadyClosed`. Handles are
//! shared through `Arc` so a caller can keep one while a non-owning
//! [`ManagedFile`](super::ManagedFile) writes through it.

use crate::error::{Error, Result, ResultExt};
use crate::tracing_compat::trace;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Access rights a handle was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    /// Readable.
    pub read: bool,
    /// Writable (including append).
    pub write: bool,
}

impl Access {
    /// Read-only access.
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    /// Write-only access.
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    /// Read and write access.
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
}

/// An OS file handle that is closed at most once.
pub struct FileHandle {
    file: Mutex<Option<std::fs::File>>,
    access: Access,
    path: Option<PathBuf>,
    releases: AtomicUsize,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FileHandle {
    /// Opens `path` with the given std options and records `access`.
    pub(crate) fn open(
        path: &Path,
        options: &std::fs::OpenOptions,
        access: Access,
    ) -> Result<Arc<Self>> {
        let file = options
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        trace!(path = %path.display(), ?access, "opened file handle");
        Ok(Arc::new(Self {
            file: Mutex::new(Some(file)),
            access,
            path: Some(path.to_owned()),
            releases: AtomicUsize::new(0),
        }))
    }

    /// Wraps an already open `std::fs::File`.
    ///
    /// `access` must describe how the file was opened; writes through a
    /// handle without write access are refused before reaching the OS.
    #[must_use]
    pub fn from_std(file: std::fs::File, access: Access) -> Arc<Self> {
        Arc::new(Self {
            file: Mutex::new(Some(file)),
            access,
            path: None,
            releases: AtomicUsize::new(0),
        })
    }

    /// Returns the access rights.
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Returns the path the handle was opened from, if known.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true once the OS handle has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Returns how many times the OS handle was actually closed (0 or 1).
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }

    /// Writes the whole buffer to the OS handle.
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        if !self.access.write {
            return Err(Error::access_denied(format!(
                "handle not opened for writing ({} bytes refused)",
                data.len()
            )));
        }
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::already_closed("file handle released"))?;
        file.write_all(data).map_err(Error::from_io)
    }

    /// Flushes OS-level buffers of the handle.
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::already_closed("file handle released"))?;
        file.flush().map_err(Error::from_io)
    }

    /// Syncs data and metadata to disk.
    pub fn sync_all(&self) -> Result<()> {
        let guard = self.file.lock();
        let file = guard
            .as_ref()
            .ok_or_else(|| Error::already_closed("file handle released"))?;
        file.sync_all().map_err(Error::from_io)
    }

    /// Returns the current length of the file.
    pub fn len(&self) -> Result<u64> {
        let guard = self.file.lock();
        let file = guard
            .as_ref()
            .ok_or_else(|| Error::already_closed("file handle released"))?;
        file.metadata().map(|m| m.len()).map_err(Error::from_io)
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Closes the OS handle.
    ///
    /// Fails with `HandleReleaseFailure` if the handle was already released.
    pub fn release(&self) -> Result<()> {
        let file = self
            .file
            .lock()
            .take()
            .ok_or_else(|| Error::handle_release("file handle already released"))?;
        drop(file);
        self.releases.fetch_add(1, Ordering::AcqRel);
        trace!(path = ?self.path, "released file handle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn write_options() -> std::fs::OpenOptions {
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        opts
    }

    #[test]
    fn write_then_release_once() {
        init_test("write_then_release_once");
        let dir = tempdir().unwrap();
        let path = dir.path().join("handle.bin");

        let handle = FileHandle::open(&path, &write_options(), Access::WRITE).unwrap();
        handle.write_all(b"abc").unwrap();
        crate::assert_with_log!(
            handle.len().unwrap() == 3,
            "len",
            3u64,
            handle.len().unwrap()
        );

        handle.release().unwrap();
        crate::assert_with_log!(handle.is_closed(), "closed", true, handle.is_closed());

        let second = handle.release().unwrap_err();
        crate::assert_with_log!(
            second.kind() == ErrorKind::HandleReleaseFailure,
            "second release kind",
            ErrorKind::HandleReleaseFailure,
            second.kind()
        );
        crate::assert_with_log!(
            handle.release_count() == 1,
            "release count",
            1usize,
            handle.release_count()
        );
        crate::test_complete!("write_then_release_once");
    }

    #[test]
    fn read_only_handle_refuses_writes() {
        init_test("read_only_handle_refuses_writes");
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.bin");
        std::fs::write(&path, b"seed").unwrap();

        let handle = FileHandle::from_std(std::fs::File::open(&path).unwrap(), Access::READ);
        let err = handle.write_all(b"x").unwrap_err();
        crate::assert_with_log!(err.is_access_denied(), "access denied", true, err.kind());
        crate::test_complete!("read_only_handle_refuses_writes");
    }

    #[test]
    fn operations_after_release_fail_closed() {
        init_test("operations_after_release_fail_closed");
        let dir = tempdir().unwrap();
        let path = dir.path().join("closed.bin");

        let handle = FileHandle::open(&path, &write_options(), Access::WRITE).unwrap();
        handle.release().unwrap();

        let write_err = handle.write_all(b"late").unwrap_err();
        crate::assert_with_log!(
            write_err.is_closed(),
            "write closed",
            true,
            write_err.kind()
        );
        let len_err = handle.len().unwrap_err();
        crate::assert_with_log!(len_err.is_closed(), "len closed", true, len_err.kind());
        crate::test_complete!("operations_after_release_fail_closed");
    }

    #[test]
    fn open_missing_file_reports_path() {
        init_test("open_missing_file_reports_path");
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let mut opts = std::fs::OpenOptions::new();
        opts.read(true);

        let err = FileHandle::open(&path, &opts, Access::READ).unwrap_err();
        let msg = err.to_string();
        crate::assert_with_log!(msg.contains("missing.bin"), "message", "path", msg);
        crate::test_complete!("open_missing_file_reports_path");
    }
}
