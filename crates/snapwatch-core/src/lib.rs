// # snapwatch-core
//
// Core library for the snapwatch change-monitoring system.
//
// ## Architecture Overview
//
// This library provides the core functionality for watching sources for
// content changes:
// - **ContentSource**: Trait for acquiring the current content of a source
// - **ContentFilter**: Trait for transforming content before comparison
// - **SnapshotStore**: Trait for versioned snapshot persistence
// - **Reporter**: Trait for delivering run reports
// - **ChangeDetector**: Evaluates observations against stored history
// - **JobRunner**: Drives one monitoring pass over a bounded worker pool
// - **RetentionManager**: Garbage collection, trimming, and rollback
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Acquisition, filtering, and reporting are
//    collaborator traits; the core never performs network I/O itself
// 2. **Append-Only History**: Snapshots are immutable once written; only
//    `last_seen` is ever updated in place
// 3. **Library-First**: All functionality is usable without the CLI

pub mod config;
pub mod detector;
pub mod error;
pub mod job;
pub mod report;
pub mod retention;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{DiffConfig, DiffMode, ReportConfig, RunConfig, StoreConfig};
pub use detector::{ChangeDetector, Detection, Verdict};
pub use error::{AcquireError, Error, Result};
pub use job::{ErrorPolicy, Job, JobId, StatusRange};
pub use report::{EntryStatus, ReportEntry, RunReport};
pub use retention::{GcStats, RetentionManager};
pub use runner::{JobRunner, JobTask};
pub use snapshot::{ContentHash, HistoryView, NewSnapshot, Payload, Snapshot};
pub use store::{open_store, MemoryStore, TextDirStore};
#[cfg(feature = "redis")]
pub use store::RedisStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use traits::{ContentFilter, ContentSource, Reporter, SnapshotStore};
