//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across the shmcount workspace, plus the [`CounterConfig`] that describes
//! where and how counter segments are allocated.
//!
//! # Usage
//!
//! ```rust,no_run
//! use shmcount_common::config::{ConfigLoader, CounterConfig, SharedConfig, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct ToolConfig {
//!     shared: SharedConfig,
//!     #[serde(default)]
//!     counter: CounterConfig,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ToolConfig::load(Path::new("config.toml"))?;
//!     config.counter.validate()?;
//!     println!("Segments live in {}", config.counter.shm_dir.display());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    COUNTER_HEADER_SIZE, DEFAULT_SEGMENT_PERMISSIONS, DEFAULT_SHM_DIR, DEFAULT_USER_DATA_SIZE,
    SEGMENT_MAX_SIZE, SEGMENT_MIN_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across shmcount applications.
///
/// This struct should be embedded in application-specific configuration
/// structs to provide consistent base configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "shmcountctl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Allocation parameters for counter segments.
///
/// Every process attaching to the same identifier must agree on
/// `shm_dir` and `user_data_size`; a size disagreement is rejected at
/// attach time.
///
/// # TOML Example
///
/// ```toml
/// [counter]
/// shm_dir = "/dev/shm"
/// user_data_size = 4032
/// permissions = 0o600
/// remove_on_last_detach = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Directory holding the segment files (a tmpfs such as `/dev/shm`).
    pub shm_dir: PathBuf,

    /// Bytes of caller-defined shared data following the header.
    pub user_data_size: usize,

    /// File mode applied when a segment file is first created.
    pub permissions: u32,

    /// Unlink the segment file when the last instance detaches.
    pub remove_on_last_detach: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            shm_dir: PathBuf::from(DEFAULT_SHM_DIR),
            user_data_size: DEFAULT_USER_DATA_SIZE,
            permissions: DEFAULT_SEGMENT_PERMISSIONS,
            remove_on_last_detach: true,
        }
    }
}

impl CounterConfig {
    /// Total segment size: header plus user data.
    pub fn segment_size(&self) -> usize {
        COUNTER_HEADER_SIZE + self.user_data_size
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `shm_dir` is empty
    /// - the total segment size is outside `SEGMENT_MIN_SIZE..=SEGMENT_MAX_SIZE`
    /// - `permissions` has bits outside `0o777`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shm_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "shm_dir cannot be empty".to_string(),
            ));
        }

        let size = self.user_data_size.saturating_add(COUNTER_HEADER_SIZE);
        if !(SEGMENT_MIN_SIZE..=SEGMENT_MAX_SIZE).contains(&size) {
            return Err(ConfigError::ValidationError(format!(
                "segment size {size} outside {SEGMENT_MIN_SIZE}..={SEGMENT_MAX_SIZE} bytes"
            )));
        }

        if self.permissions & !0o777 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "permissions {:#o} must be within 0o777",
                self.permissions
            )));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
///
/// # Example
///
/// ```rust,no_run
/// use shmcount_common::config::{ConfigLoader, SharedConfig, ConfigError};
/// use serde::Deserialize;
/// use std::path::Path;
///
/// #[derive(Debug, Deserialize)]
/// struct AppConfig {
///     shared: SharedConfig,
/// }
///
/// fn main() -> Result<(), ConfigError> {
///     let config = AppConfig::load(Path::new("config.toml"))?;
///     Ok(())
/// }
/// ```
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Successfully loaded and parsed configuration
    /// * `Err(ConfigError)` - Loading or parsing failed
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
// This allows any serde-deserializable struct to use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
