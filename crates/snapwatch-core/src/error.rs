//! Error types for the snapwatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::job::JobId;

/// Result type alias for snapwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the snapwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Acquisition or filtering failed for a single job.
    ///
    /// Never fatal to a run: the runner absorbs it into an error snapshot.
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    /// An append was attempted with a timestamp that is not strictly greater
    /// than the job's last stored timestamp. Fatal to that single append only.
    #[error("ordering violation for job {job_id}: timestamp {attempted} is not after {latest}")]
    OrderingViolation {
        /// Job whose history was being appended to
        job_id: JobId,
        /// Timestamp of the rejected append
        attempted: i64,
        /// Newest timestamp already stored for the job
        latest: i64,
    },

    /// Backend I/O or corruption. Fatal to the current run.
    #[error("store error: {0}")]
    Store(String),

    /// The backend cannot structurally delete history.
    #[error("rollback is not supported by the {backend} backend")]
    RollbackUnsupported {
        /// Backend name
        backend: &'static str,
    },

    /// Legacy-schema migration failed. Fatal at startup; a missing legacy
    /// file is not an error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Malformed job, comparison, or diff configuration. Fails before any
    /// acquisition begins.
    #[error("configuration error: {0}")]
    Config(String),

    /// External diff tool could not be invoked or reported a failure
    #[error("external diff tool failed: {0}")]
    DiffTool(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a migration error
    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an external diff tool error
    pub fn diff_tool(msg: impl Into<String>) -> Self {
        Self::DiffTool(msg.into())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Failure reported by an acquisition or filter collaborator.
///
/// The variant carries the classification needed by job-level error policy
/// (ignorable connection errors, ignorable status ranges); the core itself
/// only records and reports these, it never produces them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// Acquisition exceeded the job's timeout
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("connection failed: {0}")]
    Connection(String),

    /// Non-success protocol status
    #[error("unexpected status {0}")]
    Status(u16),

    /// Acquisition process exited unsuccessfully
    #[error("process exited with code {code}: {stderr}")]
    Process {
        /// Process exit code
        code: i32,
        /// Captured standard error, possibly truncated
        stderr: String,
    },

    /// A content filter rejected the acquired content
    #[error("filter '{name}' failed: {message}")]
    Filter {
        /// Filter name
        name: String,
        /// Failure detail
        message: String,
    },

    /// Anything else the collaborator reports
    #[error("{0}")]
    Other(String),
}

impl AcquireError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a filter error
    pub fn filter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a generic acquisition error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
