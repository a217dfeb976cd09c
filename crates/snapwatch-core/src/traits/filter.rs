//! Content filter trait
//!
//! A filter is a pure content → content function applied between acquisition
//! and change detection. Filters run in the job's declared order; a filter
//! failure is absorbed like an acquisition failure and recorded as an error
//! snapshot.

use crate::error::AcquireError;

/// Trait for content transformation collaborators
pub trait ContentFilter: Send + Sync {
    /// Filter name, used in error messages
    fn name(&self) -> &str;

    /// Transform the content. Pure computation; must not perform I/O.
    fn apply(&self, content: String) -> std::result::Result<String, AcquireError>;
}
