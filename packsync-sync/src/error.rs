//! Error types for packsync-sync.
//!
//! Every stage converts its underlying faults (I/O, network, parse) into one
//! of these kinds before returning to its caller.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single HTTP exchange, before any stage-specific meaning is
/// attached to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Manifest stage errors. Always fatal to the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("manifest request failed with HTTP {0}")]
    HttpStatus(u16),

    #[error("manifest request timed out: {0}")]
    Timeout(String),

    #[error("invalid manifest format: {0}")]
    Format(String),

    #[error("manifest request failed: {0}")]
    Network(String),
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => FetchError::Timeout(msg),
            TransportError::Network(msg) => FetchError::Network(msg),
        }
    }
}

/// A local file could not be read while hashing it.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("cannot hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-attempt transfer errors. Retried up to the configured bound.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("server answered HTTP {0}")]
    HttpStatus(u16),

    #[error(
        "digest mismatch for {filename}: expected {expected}, got {}",
        .actual.as_deref().unwrap_or("<unreadable>")
    )]
    DigestMismatch {
        filename: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransferError::Cancelled)
    }
}

impl From<TransportError> for TransferError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => TransferError::Timeout(msg),
            TransportError::Network(msg) => TransferError::Network(msg),
        }
    }
}

/// Convenience constructor for [`HashError::Io`].
pub(crate) fn hash_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HashError {
    HashError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`TransferError::Io`].
pub(crate) fn transfer_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TransferError {
    TransferError::Io {
        path: path.into(),
        source,
    }
}
