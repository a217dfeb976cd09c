//! Trait definitions for the snapwatch system
//!
//! These traits define the seams between the core and its collaborators:
//!
//! - [`SnapshotStore`]: persistent, backend-pluggable history of observations
//! - [`ContentSource`]: content acquisition (HTTP, process execution, ...)
//! - [`ContentFilter`]: pure content transformation applied before detection
//! - [`Reporter`]: delivery of a finished run report
//!
//! The core depends only on these interfaces; concrete implementations are
//! chosen at job-load time from a closed set of variants, never through a
//! string-keyed runtime registry.

pub mod filter;
pub mod reporter;
pub mod snapshot_store;
pub mod source;

pub use filter::ContentFilter;
pub use reporter::Reporter;
pub use snapshot_store::SnapshotStore;
pub use source::ContentSource;
