//! Configuration types for the snapwatch system
//!
//! A run is driven by one explicit, immutable [`RunConfig`] value constructed
//! by the caller (normally the CLI) and passed by reference through the
//! runner, detector, and store. There is no ambient global state.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Snapshot store backend selection
    pub store: StoreConfig,

    /// Worker pool size override; `None` derives it from available
    /// parallelism
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Overall run deadline in seconds; jobs not scheduled by then are
    /// reported as not run
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Report rendering settings
    #[serde(default)]
    pub report: ReportConfig,
}

impl RunConfig {
    /// Create a configuration for the given backend with defaults
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            concurrency: None,
            deadline_secs: None,
            report: ReportConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.concurrency {
            if n == 0 {
                return Err(Error::config("concurrency must be at least 1"));
            }
        }
        if let Some(secs) = self.deadline_secs {
            if secs == 0 {
                return Err(Error::config("run deadline must be at least 1 second"));
            }
        }
        Ok(())
    }
}

/// Snapshot store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Embedded relational file (SQLite), the default backend
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// Flat per-job text files under a directory
    TextDir {
        /// Directory holding one history file per job
        dir: String,
    },

    /// Remote key-value service (Redis)
    Redis {
        /// Connection URL, e.g. redis://localhost:6379
        url: String,
        /// Prefix for all keys (default: "snapwatch")
        #[serde(default)]
        key_prefix: Option<String>,
    },

    /// In-memory store, not persistent (tests and dry runs)
    Memory,
}

/// Report rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Length budget for the rendered report; `None` means unbounded.
    ///
    /// When exceeded, per-job detail is trimmed first, then omitted
    /// entirely, then whole job entries are dropped, each step leaving a
    /// note describing what was omitted.
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Include UNCHANGED jobs in the rendered report
    #[serde(default)]
    pub show_unchanged: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_length: None,
            show_unchanged: false,
        }
    }
}

/// How a job's diff is computed and rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Context lines around each hunk of the internal unified diff
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Line filtering applied to the rendered diff
    #[serde(default)]
    pub mode: DiffMode,

    /// External diff command; receives the two content blobs as file
    /// arguments and its raw stdout is used verbatim, overriding the
    /// internal rendering
    #[serde(default)]
    pub tool: Option<String>,

    /// Per-job cap on rendered diff length; truncation leaves a note
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl DiffConfig {
    /// Validate the diff configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(tool) = &self.tool {
            if tool.trim().is_empty() {
                return Err(Error::config("diff tool command cannot be empty"));
            }
        }
        if self.max_length == Some(0) {
            return Err(Error::config("diff max length cannot be zero"));
        }
        Ok(())
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            mode: DiffMode::default(),
            tool: None,
            max_length: None,
        }
    }
}

/// Diff line filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Full unified diff
    #[default]
    Full,
    /// Keep only added lines, discarding context
    AdditionsOnly,
    /// Keep only removed lines, discarding context
    DeletionsOnly,
}

fn default_context_lines() -> usize {
    3
}
