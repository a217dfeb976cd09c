//! Content source trait
//!
//! Acquisition is a collaborator concern: the core never fetches network
//! resources, renders pages, or runs acquisition processes itself. A source
//! supplies the raw (pre-filter) content for one job, or the classified
//! failure the error policy needs.
//!
//! Implementations live in their own crates (`snapwatch-source-http`,
//! `snapwatch-source-exec`) and are constructed at job-load time.

use async_trait::async_trait;

use crate::error::AcquireError;

/// Trait for acquisition collaborators
///
/// Implementations must be thread-safe; the runner calls `fetch` from a
/// bounded pool of concurrent tasks. Cancellation safety matters: the runner
/// drops the future on timeout.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// The opaque location this source reads from (for logs and reports)
    fn location(&self) -> &str;

    /// Acquire the current content of the monitored source
    async fn fetch(&self) -> std::result::Result<String, AcquireError>;
}
