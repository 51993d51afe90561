//! Error types for shared counter operations

use common::config::ConfigError;
use thiserror::Error;

/// Broad classification of a [`ShmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The segment could not be created, opened, sized or mapped.
    Segment,
    /// The segment lock could not be acquired or released.
    Lock,
    /// The caller passed an unusable argument (name, range, configuration).
    Argument,
}

/// Errors that can occur during shared counter operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Identifier is empty or too long after rectification
    #[error("Invalid segment identifier {name:?}: {reason}")]
    InvalidName {
        /// Identifier as passed by the caller
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Segment size outside the supported range
    #[error("Invalid segment size: {size} bytes")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
    },

    /// An existing segment of the same name has a different size
    #[error("Segment {name} has size {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Rectified segment name
        name: String,
        /// Size this process asked for
        expected: usize,
        /// Size found on the existing segment
        actual: u64,
    },

    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Rectified segment name
        name: String,
    },

    /// Permission denied
    #[error("Permission denied accessing segment: {name}")]
    PermissionDenied {
        /// Rectified segment name
        name: String,
    },

    /// System resources exhausted
    #[error("System resource exhausted while allocating segment: {name}")]
    ResourceExhausted {
        /// Rectified segment name
        name: String,
    },

    /// User-data access outside the shared region
    #[error("Range {offset}+{len} exceeds user data size {size}")]
    InvalidRange {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Size of the user-data region
        size: usize,
    },

    /// Lock acquisition or release failed
    #[error("Lock error on segment {name}: {source}")]
    Lock {
        /// Rectified segment name
        name: String,
        /// Underlying errno
        source: nix::Error,
    },

    /// Invalid counter configuration
    #[error("Configuration error: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: ConfigError,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

impl ShmError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShmError::Lock { .. } => ErrorKind::Lock,
            ShmError::InvalidName { .. }
            | ShmError::InvalidRange { .. }
            | ShmError::Config { .. } => ErrorKind::Argument,
            ShmError::InvalidSize { .. }
            | ShmError::SizeMismatch { .. }
            | ShmError::NotFound { .. }
            | ShmError::PermissionDenied { .. }
            | ShmError::ResourceExhausted { .. }
            | ShmError::Io { .. } => ErrorKind::Segment,
        }
    }

    /// Map an allocation IO error to the matching segment error.
    pub(crate) fn from_io(name: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => ShmError::NotFound {
                name: name.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => ShmError::PermissionDenied {
                name: name.to_string(),
            },
            _ => match source.raw_os_error() {
                Some(libc::ENOSPC | libc::ENOMEM | libc::EMFILE | libc::ENFILE) => {
                    ShmError::ResourceExhausted {
                        name: name.to_string(),
                    }
                }
                _ => ShmError::Io { source },
            },
        }
    }
}

/// Result type for shared counter operations
pub type ShmResult<T> = Result<T, ShmError>;
