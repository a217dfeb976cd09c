//! In-memory snapshot store
//!
//! Reference implementation of the store contract. Not persistent; used by
//! tests and dry runs. There is no legacy layout to migrate from.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{classify_append, retain_from, AppendAction};
use crate::error::Result;
use crate::job::JobId;
use crate::snapshot::{ContentHash, NewSnapshot, Snapshot};
use crate::traits::SnapshotStore;

/// In-memory snapshot store
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Job id → oldest-first sequence
    jobs: RwLock<HashMap<JobId, Vec<Snapshot>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn recent(&self, job_id: &JobId, n: usize) -> Result<Vec<Snapshot>> {
        let jobs = self.jobs.read().await;
        let Some(seq) = jobs.get(job_id) else {
            return Ok(Vec::new());
        };
        Ok(seq.iter().rev().take(n).cloned().collect())
    }

    async fn append(&self, job_id: &JobId, new: NewSnapshot) -> Result<Snapshot> {
        let mut jobs = self.jobs.write().await;
        let seq = jobs.entry(job_id.clone()).or_default();

        match classify_append(job_id, seq.last(), &new)? {
            AppendAction::Dedup => {
                // classify_append only returns Dedup when a latest row exists
                let last = seq.last_mut().ok_or_else(|| {
                    crate::Error::store("dedup append resolved without a latest row")
                })?;
                last.last_seen = last.last_seen.max(new.timestamp);
                Ok(last.clone())
            }
            AppendAction::Insert => {
                let snapshot = new.into_snapshot(job_id);
                seq.push(snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    async fn mark_seen(&self, job_id: &JobId, hash: &ContentHash, timestamp: i64) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let Some(seq) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id = %job_id, "mark_seen on unknown job");
            return Ok(());
        };
        match seq.iter_mut().rev().find(|s| s.hash() == Some(hash)) {
            Some(snap) => snap.last_seen = timestamp,
            None => tracing::warn!(job_id = %job_id, hash = %hash, "mark_seen found no matching row"),
        }
        Ok(())
    }

    async fn all_job_ids(&self) -> Result<HashSet<JobId>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.keys().cloned().collect())
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs.remove(job_id).map(|seq| seq.len() as u64).unwrap_or(0))
    }

    async fn trim(&self, job_id: &JobId, keep_distinct: usize) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let Some(seq) = jobs.get_mut(job_id) else {
            return Ok(0);
        };
        let from = retain_from(seq, keep_distinct);
        seq.drain(..from);
        Ok(from as u64)
    }

    async fn rollback(&self, cutoff: i64) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let mut removed = 0u64;
        jobs.retain(|_, seq| {
            let before = seq.len();
            seq.retain(|s| s.timestamp <= cutoff);
            removed += (before - seq.len()) as u64;
            !seq.is_empty()
        });
        Ok(removed)
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
