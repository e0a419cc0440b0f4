#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

pub use managed_fs::test_utils::{env_lock, init_test_logging, RecordingHook};
pub use managed_fs::{assert_with_log, test_complete, test_phase, test_section};

use managed_fs::fs::{Access, FileHandle};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "MANAGED_FS_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);

    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }

    // If CI is set and no explicit seed is provided, use a fixed seed.
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }

    None
}

/// Scratch directory plus a path inside it.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Creates a fresh scratch directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create scratch dir"),
        }
    }

    /// Returns a path for `name` inside the directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Creates `name` with `contents` and returns its path.
    pub fn seed_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("seed file");
        path
    }
}

/// Opens `path` read-only and wraps it as a shared handle.
#[must_use]
pub fn read_only_handle(path: &Path) -> Arc<FileHandle> {
    let file = std::fs::File::open(path).expect("open read-only");
    FileHandle::from_std(file, Access::READ)
}

/// Opens `path` for writing and wraps it as a shared handle.
#[must_use]
pub fn writable_handle(path: &Path) -> Arc<FileHandle> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .expect("open writable");
    FileHandle::from_std(file, Access::WRITE)
}
