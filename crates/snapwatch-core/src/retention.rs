//! History maintenance
//!
//! Groups the destructive store operations behind one type: garbage
//! collection of jobs no longer configured, trimming of live histories, and
//! point-in-time rollback. Per-job failures during a sweep are logged and
//! skipped so one bad history cannot block maintenance of the rest.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::Result;
use crate::job::{Job, JobId};
use crate::traits::SnapshotStore;

/// Outcome of a garbage-collection sweep
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Histories deleted because no configured job references them
    pub removed_jobs: u64,
    /// Rows dropped from live histories by trimming
    pub removed_snapshots: u64,
}

/// Destructive maintenance over a snapshot store
pub struct RetentionManager<'a> {
    store: &'a dyn SnapshotStore,
}

impl<'a> RetentionManager<'a> {
    pub fn new(store: &'a dyn SnapshotStore) -> Self {
        Self { store }
    }

    /// Delete histories of jobs absent from the current configuration, then
    /// trim each live history to its job's comparison depth.
    ///
    /// Every job is validated up front: a zero comparison depth would trim a
    /// live history down to nothing, so nothing is deleted until the whole
    /// job list is known to be well-formed.
    pub async fn garbage_collect(&self, jobs: &[Job]) -> Result<GcStats> {
        for job in jobs {
            job.validate()?;
        }
        let live: HashSet<&JobId> = jobs.iter().map(|j| &j.id).collect();
        let mut stats = GcStats::default();

        for job_id in self.store.all_job_ids().await? {
            if live.contains(&job_id) {
                continue;
            }
            match self.store.remove_job(&job_id).await {
                Ok(rows) => {
                    info!(job_id = %job_id, rows, "removed unconfigured job history");
                    stats.removed_jobs += 1;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "failed to remove job history");
                }
            }
        }

        for job in jobs {
            match self.store.trim(&job.id, job.comparison_depth).await {
                Ok(rows) if rows > 0 => {
                    info!(job = %job.name, rows, "trimmed job history");
                    stats.removed_snapshots += rows;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(job = %job.name, error = %e, "failed to trim job history");
                }
            }
        }

        Ok(stats)
    }

    /// Trim excess history for the given jobs without touching anything else
    pub async fn clean(&self, jobs: &[Job]) -> Result<u64> {
        for job in jobs {
            job.validate()?;
        }
        let mut removed = 0u64;
        for job in jobs {
            match self.store.trim(&job.id, job.comparison_depth).await {
                Ok(rows) => removed += rows,
                Err(e) => {
                    warn!(job = %job.name, error = %e, "failed to trim job history");
                }
            }
        }
        info!(removed, "cleaned snapshot store");
        Ok(removed)
    }

    /// Drop every snapshot newer than `cutoff` (epoch seconds)
    pub async fn rollback(&self, cutoff: i64) -> Result<u64> {
        let removed = self.store.rollback(cutoff).await?;
        info!(cutoff, removed, "rolled back snapshot store");
        Ok(removed)
    }
}
