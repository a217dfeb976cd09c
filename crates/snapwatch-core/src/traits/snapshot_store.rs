//! Snapshot store trait
//!
//! The store is the aggregate of all jobs' snapshot sequences plus metadata
//! (schema version, backend identity). It is the only shared mutable
//! resource in the system: it owns its internal locking and transaction
//! discipline and is the sole arbiter of write atomicity. No other component
//! touches persisted state directly.
//!
//! ## Write serialization
//!
//! Exactly one writer may mutate a given job's sequence at a time.
//! Concurrent writers to different jobs may proceed independently when the
//! backend supports it; a backend that cannot guarantee this (a single-file
//! embedded engine) must serialize all writes store-wide. Readers never
//! observe a partially written snapshot.
//!
//! ## Append policy
//!
//! `append` rejects a timestamp not strictly greater than the job's last
//! stored timestamp. The one exception is explicit and tested: an append
//! whose content hash equals the latest stored row's hash does not create a
//! new physical row; it updates that row's `last_seen` and returns the
//! merged row.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::job::JobId;
use crate::snapshot::{ContentHash, NewSnapshot, Snapshot};

/// Trait for snapshot store backends
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Up to `n` snapshots for the job, most-recent-first.
    ///
    /// An unknown job id yields an empty sequence, not an error; errors mean
    /// the backend itself is unreadable.
    async fn recent(&self, job_id: &JobId, n: usize) -> Result<Vec<Snapshot>>;

    /// Record a new observation.
    ///
    /// Returns the stored snapshot: a fresh row, or the latest row with its
    /// `last_seen` advanced when the content hash matches back-to-back.
    /// Fails with [`Error::OrderingViolation`] on a non-increasing timestamp.
    ///
    /// [`Error::OrderingViolation`]: crate::Error::OrderingViolation
    async fn append(&self, job_id: &JobId, new: NewSnapshot) -> Result<Snapshot>;

    /// Advance `last_seen` on the stored row with the given content hash.
    ///
    /// Used by the detector when a new observation is identical to a
    /// historical candidate (which need not be the latest row).
    async fn mark_seen(&self, job_id: &JobId, hash: &ContentHash, timestamp: i64) -> Result<()>;

    /// All job ids present in the store
    async fn all_job_ids(&self) -> Result<HashSet<JobId>>;

    /// Delete a job's entire sequence; returns the number of removed
    /// snapshots
    async fn remove_job(&self, job_id: &JobId) -> Result<u64>;

    /// Trim a job's history to the newest rows covering `keep_distinct`
    /// distinct content hashes; returns the number of removed snapshots
    async fn trim(&self, job_id: &JobId, keep_distinct: usize) -> Result<u64>;

    /// Delete, across all jobs, every snapshot with `timestamp > cutoff`;
    /// returns the number of removed snapshots.
    ///
    /// Idempotent. Backends without structural deletion fail with
    /// [`Error::RollbackUnsupported`].
    ///
    /// [`Error::RollbackUnsupported`]: crate::Error::RollbackUnsupported
    async fn rollback(&self, cutoff: i64) -> Result<u64>;

    /// Detect the legacy on-disk schema and carry over the latest record per
    /// job, for jobs not already present; returns the number of migrated
    /// jobs.
    ///
    /// Idempotent. The legacy file is left untouched for manual removal.
    /// Absence of legacy data is success-with-zero; unreadable legacy data
    /// is a [`Error::Migration`] failure.
    ///
    /// [`Error::Migration`]: crate::Error::Migration
    async fn migrate_legacy(&self) -> Result<usize>;

    /// Release backend resources; safe to call multiple times
    async fn close(&self) -> Result<()>;

    /// Backend identity for logs and error messages
    fn backend_name(&self) -> &'static str;
}
