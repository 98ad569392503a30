//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the Blob Navigator
//!
//! This module defines the error enum used across the crate. Each variant
//! carries enough context to be shown in the status bar as-is, and all library
//! modules return `Result<T, AppError>`.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Unified error type for navigation, transfer and configuration failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Storage backend call failed.
    #[error("Backend {operation} failed: {message}")]
    Backend {
        operation: String, // "list_containers", "open_read_stream", ...
        message: String,
        retryable: bool,
    },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Blob not found: {container}/{name}")]
    BlobNotFound { container: String, name: String },

    /// Listing a level failed; the previous view stays on screen.
    #[error("Navigation failed at {location}: {reason}")]
    NavigationFailed { location: String, reason: String },

    /// Input validation errors
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Target path exceeds the {limit} character limit: {path:?}")]
    PathTooLong { path: PathBuf, limit: usize },

    /// Downloaded content does not hash to the expected digest.
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Transfer failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Transfer of {blob} stalled for more than {timeout_secs}s")]
    TransferTimeout { blob: String, timeout_secs: u64 },

    /// Operation cancelled by user or system.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl AppError {
    /// Create a backend failure error
    pub fn backend<S1: Into<String>, S2: Into<String>>(
        operation: S1,
        message: S2,
        retryable: bool,
    ) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Create a navigation failure error
    pub fn navigation_failed<S1: Into<String>, S2: Into<String>>(location: S1, reason: S2) -> Self {
        Self::NavigationFailed {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create an input validation error
    pub fn invalid_input<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a transfer that failed with this error may be restarted from
    /// its last offset.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::WouldBlock
            ),
            Self::Backend { retryable, .. } => *retryable,
            Self::TransferTimeout { .. } => true,
            _ => false,
        }
    }
}

// Manual Clone implementation to handle non-Clone fields
impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Config(e) => Self::Other(format!("Config error: {e}")),
            Self::ConfigIo { path, source } => Self::ConfigIo {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::Backend {
                operation,
                message,
                retryable,
            } => Self::Backend {
                operation: operation.clone(),
                message: message.clone(),
                retryable: *retryable,
            },
            Self::ContainerNotFound(name) => Self::ContainerNotFound(name.clone()),
            Self::BlobNotFound { container, name } => Self::BlobNotFound {
                container: container.clone(),
                name: name.clone(),
            },
            Self::NavigationFailed { location, reason } => Self::NavigationFailed {
                location: location.clone(),
                reason: reason.clone(),
            },
            Self::InvalidInput { field, message } => Self::InvalidInput {
                field: field.clone(),
                message: message.clone(),
            },
            Self::PathTooLong { path, limit } => Self::PathTooLong {
                path: path.clone(),
                limit: *limit,
            },
            Self::ChecksumMismatch {
                path,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                path: path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::RetriesExhausted { attempts, source } => Self::RetriesExhausted {
                attempts: *attempts,
                source: source.clone(),
            },
            Self::TransferTimeout { blob, timeout_secs } => Self::TransferTimeout {
                blob: blob.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::Cancelled => Self::Cancelled,
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_io_is_retryable() {
        let err = AppError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_retryable());

        let err = AppError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_terminal_variants_are_not_retryable() {
        let mismatch = AppError::ChecksumMismatch {
            path: PathBuf::from("a.bin"),
            expected: "md5:00".into(),
            actual: "md5:11".into(),
        };
        assert!(!mismatch.is_retryable());
        assert!(!AppError::Cancelled.is_retryable());
        assert!(AppError::backend("open_read_stream", "503", true).is_retryable());
        assert!(!AppError::backend("get_blob", "403", false).is_retryable());
    }

    #[test]
    fn test_clone_preserves_io_kind() {
        let err = AppError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        match err.clone() {
            AppError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected clone: {other:?}"),
        }
    }
}
