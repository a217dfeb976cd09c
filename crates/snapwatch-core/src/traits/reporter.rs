//! Reporter trait
//!
//! Notification delivery is a collaborator concern: the core assembles an
//! ordered [`RunReport`] and hands it over.
//!
//! [`RunReport`]: crate::report::RunReport

use async_trait::async_trait;

use crate::error::Result;
use crate::report::RunReport;

/// Trait for report delivery collaborators
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Deliver a finished run report
    async fn deliver(&self, report: &RunReport) -> Result<()>;
}
