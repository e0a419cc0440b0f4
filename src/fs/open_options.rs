//! Options and flags for configuring how a managed file is opened.
//!
//! This module provides [`OpenOptions`], a builder for controlling file
//! open behavior plus the lifecycle settings of the resulting
//! [`ManagedFile`]. The file-mode half mirrors `std::fs::OpenOptions`.

use super::cleanup::{CleanupHook, NoopHook};
use super::handle::{Access, FileHandle};
use super::ManagedFile;
use crate::config::{ReflushPolicy, StreamConfig};
use crate::error::Result;
use crate::observability::LifecycleStats;
use crate::reclaim::ReclaimHandle;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Options for opening a managed file.
///
/// # Example
///
/// ```no_run
/// use managed_fs::fs::OpenOptions;
///
/// # fn main() -> managed_fs::Result<()> {
/// let mut file = OpenOptions::new()
///     .write(true)
///     .create(true)
///     .buffer_size(16 * 1024)
///     .open("example.bin")?;
/// file.write(b"data")?;
/// file.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
    #[cfg(unix)]
    mode: Option<u32>,
    config: StreamConfig,
    hook: Option<Arc<dyn CleanupHook>>,
    stats: Option<Arc<LifecycleStats>>,
    reclaimer: Option<ReclaimHandle>,
}

impl OpenOptions {
    /// Creates a new set of options with default settings.
    ///
    /// All mode flags start `false`; lifecycle settings use
    /// [`StreamConfig::default()`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            read: false,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
            #[cfg(unix)]
            mode: None,
            config: StreamConfig::default(),
            hook: None,
            stats: None,
            reclaimer: None,
        }
    }

    /// Sets the option for read access.
    #[must_use]
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Sets the option for write access.
    #[must_use]
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Sets the option for append mode.
    #[must_use]
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Sets the option to truncate a previous file.
    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Sets the option to create a new file if it does not exist.
    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Sets the option to create a new file, failing if it already exists.
    #[must_use]
    pub fn create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    /// Sets the mode bits that a new file will be created with (Unix only).
    #[cfg(unix)]
    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Replaces the whole stream configuration.
    #[must_use]
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the write buffer capacity. Zero disables buffering.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    /// Sets what repeated `close()` calls do after a failed flush.
    #[must_use]
    pub fn reflush(mut self, reflush: ReflushPolicy) -> Self {
        self.config.reflush = reflush;
        self
    }

    /// Installs the cleanup hook run by every release path.
    #[must_use]
    pub fn cleanup_hook(mut self, hook: Arc<dyn CleanupHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Records lifecycle events into `stats`.
    #[must_use]
    pub fn stats(mut self, stats: Arc<LifecycleStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Defers implicit cleanup of dropped streams to a reclaimer thread.
    #[must_use]
    pub fn reclaimer(mut self, reclaimer: ReclaimHandle) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    /// Opens a file at `path` with the options specified by `self`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<ManagedFile> {
        let handle = FileHandle::open(path.as_ref(), &self.to_std_options(), self.access())?;
        Ok(self.build(handle, true))
    }

    /// Wraps an existing handle instead of opening a path.
    ///
    /// Mode flags are ignored; the handle's own access rights apply.
    #[must_use]
    pub fn wrap(&self, handle: Arc<FileHandle>, owns_handle: bool) -> ManagedFile {
        self.build(handle, owns_handle)
    }

    fn build(&self, handle: Arc<FileHandle>, owns_handle: bool) -> ManagedFile {
        let hook = self
            .hook
            .clone()
            .unwrap_or_else(|| Arc::new(NoopHook) as Arc<dyn CleanupHook>);
        ManagedFile::from_parts(
            handle,
            owns_handle,
            self.config,
            hook,
            self.stats.clone(),
            self.reclaimer.clone(),
        )
    }

    fn access(&self) -> Access {
        Access {
            read: self.read,
            write: self.write || self.append,
        }
    }

    /// Converts these options to `std::fs::OpenOptions`.
    fn to_std_options(&self) -> std::fs::OpenOptions {
        let mut opts = std::fs::OpenOptions::new();
        opts.read(self.read);
        opts.write(self.write);
        opts.append(self.append);
        opts.truncate(self.truncate);
        opts.create(self.create);
        opts.create_new(self.create_new);

        #[cfg(unix)]
        if let Some(mode) = self.mode {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }

        opts
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("read", &self.read)
            .field("write", &self.write)
            .field("append", &self.append)
            .field("truncate", &self.truncate)
            .field("create", &self.create)
            .field("create_new", &self.create_new)
            .field("config", &self.config)
            .field("hook", &self.hook.is_some())
            .field("stats", &self.stats.is_some())
            .field("reclaimer", &self.reclaimer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn open_options_builder() {
        init_test("open_options_builder");
        let opts = OpenOptions::new().read(true).write(true).create(true);

        crate::assert_with_log!(opts.read, "read", true, opts.read);
        crate::assert_with_log!(opts.write, "write", true, opts.write);
        crate::assert_with_log!(opts.create, "create", true, opts.create);
        crate::assert_with_log!(!opts.append, "append false", false, opts.append);
        crate::assert_with_log!(!opts.truncate, "truncate false", false, opts.truncate);
        crate::assert_with_log!(!opts.create_new, "create_new false", false, opts.create_new);
        crate::test_complete!("open_options_builder");
    }

    #[test]
    fn open_options_default() {
        init_test("open_options_default");
        let opts = OpenOptions::default();
        crate::assert_with_log!(!opts.read, "read false", false, opts.read);
        crate::assert_with_log!(!opts.write, "write false", false, opts.write);
        crate::assert_with_log!(
            opts.config == StreamConfig::default(),
            "default config",
            StreamConfig::default(),
            opts.config
        );
        crate::assert_with_log!(opts.hook.is_none(), "no hook", true, opts.hook.is_none());
        crate::test_complete!("open_options_default");
    }

    #[test]
    fn lifecycle_settings_apply() {
        init_test("lifecycle_settings_apply");
        let opts = OpenOptions::new()
            .buffer_size(0)
            .reflush(ReflushPolicy::HookOnly);
        crate::assert_with_log!(
            opts.config.buffer_size == 0,
            "buffer",
            0usize,
            opts.config.buffer_size
        );
        crate::assert_with_log!(
            opts.config.reflush == ReflushPolicy::HookOnly,
            "reflush",
            ReflushPolicy::HookOnly,
            opts.config.reflush
        );
        crate::test_complete!("lifecycle_settings_apply");
    }

    #[test]
    fn append_implies_write_access() {
        init_test("append_implies_write_access");
        let access = OpenOptions::new().append(true).access();
        crate::assert_with_log!(access.write, "write access", true, access);
        let ro = OpenOptions::new().read(true).access();
        crate::assert_with_log!(ro == Access::READ, "read only", Access::READ, ro);
        crate::test_complete!("append_implies_write_access");
    }

    #[test]
    fn open_and_wrap_ownership() {
        init_test("open_and_wrap_ownership");
        let dir = tempdir().unwrap();
        let path = dir.path().join("own.bin");

        let opened = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        crate::assert_with_log!(
            opened.owns_handle(),
            "opened owns",
            true,
            opened.owns_handle()
        );

        let handle = Arc::clone(opened.handle());
        let wrapped = OpenOptions::new().wrap(handle, false);
        crate::assert_with_log!(
            !wrapped.owns_handle(),
            "wrapped borrows",
            false,
            wrapped.owns_handle()
        );
        crate::test_complete!("open_and_wrap_ownership");
    }

    #[cfg(unix)]
    #[test]
    fn mode_option_unix() {
        init_test("mode_option_unix");
        let opts = OpenOptions::new().write(true).create(true).mode(0o600);
        crate::assert_with_log!(opts.mode == Some(0o600), "mode", Some(0o600), opts.mode);
        crate::test_complete!("mode_option_unix");
    }
}
