//! Plain-text report delivery
//!
//! The only built-in reporter writes the rendered report to standard
//! output. Anything richer (mail, chat webhooks) implements the same trait
//! out of tree.

use async_trait::async_trait;

use snapwatch_core::traits::Reporter;
use snapwatch_core::{ReportConfig, Result, RunReport};

/// Writes the rendered report to standard output
pub struct StdoutReporter {
    config: ReportConfig,
}

impl StdoutReporter {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Reporter for StdoutReporter {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        print!("{}", report.render(&self.config));
        Ok(())
    }
}
