//! Application error types for conda-firewall
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::config::ConfigError;
use crate::server::ServerError;

/// Catalog loading errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    /// Catalog file could not be read
    #[error("Failed to read catalog {path}: {message}")]
    Read { path: String, message: String },

    /// Catalog JSON is malformed or missing required fields
    #[error("Failed to parse catalog {path}: {message}")]
    Parse { path: String, message: String },
}

/// Atomic publish errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PublishError {
    /// Creating, writing or renaming the temporary file failed
    #[error("Failed to publish {path}: {message}")]
    Io { path: String, message: String },
}

impl PublishError {
    pub(crate) fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        PublishError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Synchronization-related errors
///
/// Each variant describes the failure of a single channel/subdir step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Upstream answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Download exceeded the configured timeout
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    /// Generic network error
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Raw catalog missing or malformed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Allowlist file could not be read
    #[error("Failed to read allowlist {path}: {message}")]
    Allowlist { path: String, message: String },

    /// Filtered catalog could not be encoded
    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },

    /// Writing a file into place failed
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl SyncError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout {
                url: url.to_string(),
            }
        } else {
            SyncError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Every failure collected from a batch operation
///
/// Batch operations keep going after a failure; this error carries all of
/// them in the order they happened.
#[derive(Debug, Error, Clone, Default, PartialEq)]
#[error("{}", join_errors(.errors))]
pub struct BatchError {
    pub errors: Vec<SyncError>,
}

impl BatchError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<SyncError>) {
        self.errors.push(error.into());
    }

    /// Absorb the errors of another batch
    pub fn merge(&mut self, other: BatchError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when nothing failed, otherwise the batch itself
    pub fn into_result(self) -> Result<(), BatchError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<SyncError> for BatchError {
    fn from(error: SyncError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

fn join_errors(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Proxy-related errors
///
/// These never reach the client verbatim; handlers log them and answer
/// with a generic status.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Upstream request failed or timed out
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Reading a filtered catalog failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level error type
///
/// This is the main error type used throughout the application.
/// It aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sync errors
    #[error("Sync failed:\n{0}")]
    Sync(#[from] BatchError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Logging setup error
    #[error("Logging error: {0}")]
    Logging(String),
}
