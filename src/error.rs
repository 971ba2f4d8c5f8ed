//! # Index Store Error Types
//!
//! Structured error handling for the checkpoint index store using thiserror.
//! Backend failures are kept separate from store-level errors so that
//! "object absent" can never be confused with an operational fault.

use std::fmt;
use thiserror::Error;

/// Errors reported by a [`Backend`](crate::backend::Backend) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No object stored under key: {key}")]
    NotFound { key: String },

    #[error("Backend operation failed for key {key}: {message}")]
    Other { key: String, message: String },
}

impl BackendError {
    /// Create a not-found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a generic backend failure
    pub fn other(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Map an I/O error against `key`, keeping the not-found distinction
    pub fn from_io(key: impl Into<String>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(key)
        } else {
            Self::other(key, err.to_string())
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Comprehensive index store error types
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid checkpoint {checkpoint}: checkpoints start at 1")]
    InvalidCheckpoint { checkpoint: u32 },

    #[error("Unable to write index for account {account}: {source}")]
    BackendWrite {
        account: String,
        #[source]
        source: BackendError,
    },

    #[error("No index exists for account {account}")]
    NotFound { account: String },

    #[error("Unable to read index for account {account}: {source}")]
    BackendRead {
        account: String,
        #[source]
        source: BackendError,
    },

    #[error("Write cancelled for account {account}")]
    Cancelled { account: String },

    #[error("Write task panicked for account {account}")]
    WorkerPanic { account: String },

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl IndexError {
    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a backend write error for `account`
    pub fn backend_write(account: impl Into<String>, source: BackendError) -> Self {
        Self::BackendWrite {
            account: account.into(),
            source,
        }
    }

    /// Classify a backend read failure, keeping absence distinct from faults
    pub fn backend_read(account: impl Into<String>, source: BackendError) -> Self {
        let account = account.into();
        match source {
            BackendError::NotFound { .. } => Self::NotFound { account },
            other => Self::BackendRead {
                account,
                source: other,
            },
        }
    }

    /// Create a cancellation error
    pub fn cancelled(account: impl Into<String>) -> Self {
        Self::Cancelled {
            account: account.into(),
        }
    }

    pub fn worker_panic(account: impl Into<String>) -> Self {
        Self::WorkerPanic {
            account: account.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Only transient backend write failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendWrite { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rmp_serde::encode::Error> for IndexError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        IndexError::serialization(format!("encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for IndexError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        IndexError::serialization(format!("decode: {err}"))
    }
}

impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::configuration(err.to_string())
    }
}

/// A batch that reached the `Failed` state during a flush
#[derive(Debug)]
pub struct BatchFailure {
    pub account: String,
    pub attempts: u32,
    pub error: IndexError,
}

/// Every terminal batch failure from one flush, in completion order
#[derive(Debug, Default)]
pub struct FlushError {
    pub failures: Vec<BatchFailure>,
}

impl FlushError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Accounts that need to be resubmitted in a later flush
    pub fn accounts(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.account.as_str()).collect()
    }

    pub fn failure_for(&self, account: &str) -> Option<&BatchFailure> {
        self.failures.iter().find(|f| f.account == account)
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flush failed for {} account(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "; {} after {} attempt(s): {}",
                failure.account, failure.attempts, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for FlushError {}

/// Result type alias for index store operations
pub type Result<T> = std::result::Result<T, IndexError>;
