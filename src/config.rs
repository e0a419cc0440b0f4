//! Stream configuration with environment and config-file support.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set on [`StreamConfig`] or via `OpenOptions`
//! 2. **Environment variables**: values from `MANAGED_FS_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: [`StreamConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `MANAGED_FS_BUFFER_SIZE` | `usize` | `buffer_size` |
//! | `MANAGED_FS_REFLUSH` | `retry` \| `hook-only` | `reflush` |
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `buffer_size` | 4096 |
//! | `reflush` | [`ReflushPolicy::Retry`] |

use std::fmt;
use std::str::FromStr;

/// Environment variable name for the write buffer size.
pub const ENV_BUFFER_SIZE: &str = "MANAGED_FS_BUFFER_SIZE";
/// Environment variable name for the reflush policy.
pub const ENV_REFLUSH: &str = "MANAGED_FS_REFLUSH";

/// Default write buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Error raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or key name.
        var: String,
        /// Description of the accepted values.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },
    /// The config file could not be read or parsed.
    #[error("failed to load config file: {0}")]
    File(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        Self::new(crate::error::ErrorKind::Config)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// What a repeated explicit `close()` does with bytes whose flush failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflushPolicy {
    /// Keep the failed bytes staged; every later `close()` retries the flush
    /// and reports the failure again.
    #[default]
    Retry,
    /// Report the failure once, then discard the bytes. Later `close()` calls
    /// only invoke the cleanup hook.
    HookOnly,
}

impl ReflushPolicy {
    /// Returns the canonical config-string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::HookOnly => "hook-only",
        }
    }
}

impl fmt::Display for ReflushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReflushPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "hook-only" | "hook_only" | "hookonly" => Ok(Self::HookOnly),
            _ => Err(ConfigError::InvalidValue {
                var: ENV_REFLUSH.to_string(),
                expected: "retry or hook-only",
                value: s.to_string(),
            }),
        }
    }
}

/// Per-stream configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Write buffer capacity. Zero disables buffering.
    pub buffer_size: usize,
    /// Behavior of repeated `close()` after a failed flush.
    pub reflush: ReflushPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            reflush: ReflushPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Sets the write buffer capacity.
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the reflush policy.
    #[must_use]
    pub const fn with_reflush(mut self, reflush: ReflushPolicy) -> Self {
        self.reflush = reflush;
        self
    }

    /// Returns true if writes are staged in a buffer.
    #[must_use]
    pub const fn is_buffered(&self) -> bool {
        self.buffer_size > 0
    }

    /// Builds a config from the defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

/// Apply environment variable overrides to a [`StreamConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut StreamConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_BUFFER_SIZE) {
        config.buffer_size = parse_usize(ENV_BUFFER_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_REFLUSH) {
        config.reflush = val.parse()?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            var: var_name.to_string(),
            expected: "unsigned integer",
            value: val.to_string(),
        })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable stream configuration.
///
/// ```toml
/// [stream]
/// buffer_size = 8192
/// reflush = "hook-only"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct TomlConfig {
    /// Stream settings.
    #[serde(default)]
    pub stream: StreamToml,
}

/// Stream section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct StreamToml {
    /// Write buffer capacity.
    pub buffer_size: Option<usize>,
    /// Reflush policy (`retry` or `hook-only`).
    pub reflush: Option<String>,
}

/// Apply a parsed TOML config to a [`StreamConfig`].
///
/// Only fields present in the file override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut StreamConfig, toml: &TomlConfig) -> Result<(), ConfigError> {
    if let Some(v) = toml.stream.buffer_size {
        config.buffer_size = v;
    }
    if let Some(ref v) = toml.stream.reflush {
        config.reflush = v.parse()?;
    }
    Ok(())
}

/// Parse a TOML string into a [`TomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<TomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::File(e.to_string()))
}

/// Load a [`StreamConfig`] from a TOML file, then apply environment overrides.
#[cfg(feature = "config-file")]
pub fn load_file(path: &std::path::Path) -> Result<StreamConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
    let parsed = parse_toml_str(&content)?;
    let mut config = StreamConfig::default();
    apply_toml_config(&mut config, &parsed)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}
