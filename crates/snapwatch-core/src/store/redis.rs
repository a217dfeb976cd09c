//! Redis snapshot store
//!
//! History lives in one list per job (`<prefix>:hist:<job_id>`, oldest
//! first, JSON-serialized snapshots) plus a set of known job ids
//! (`<prefix>:jobs`). A process-local mutex serializes writes; the contract
//! does not require cross-process write coordination.
//!
//! Rollback is unsupported here: list surgery across every job cannot be
//! made atomic with these primitives, and the operation exists for local
//! recovery anyway.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::info;

use super::{classify_append, retain_from, AppendAction};
use crate::error::{Error, Result};
use crate::job::JobId;
use crate::snapshot::{ContentHash, NewSnapshot, Snapshot};
use crate::traits::SnapshotStore;

const DEFAULT_PREFIX: &str = "snapwatch";

/// Redis-backed snapshot store
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    write_lock: Mutex<()>,
}

impl RedisStore {
    /// Connect to the Redis instance at `url`
    pub async fn connect(url: &str, key_prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "connected to redis snapshot store");

        Ok(Self {
            conn,
            key_prefix: key_prefix.unwrap_or(DEFAULT_PREFIX).to_string(),
            write_lock: Mutex::new(()),
        })
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.key_prefix)
    }

    fn hist_key(&self, job_id: &JobId) -> String {
        format!("{}:hist:{}", self.key_prefix, job_id)
    }

    /// Load the newest `n` rows, most-recent-first
    async fn load_recent(&self, job_id: &JobId, n: isize) -> Result<Vec<Snapshot>> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(self.hist_key(job_id), -n, -1).await?;

        let mut snapshots = Vec::with_capacity(raw.len());
        for line in raw.iter().rev() {
            snapshots.push(serde_json::from_str(line)?);
        }
        Ok(snapshots)
    }

    async fn rewrite(&self, job_id: &JobId, seq: &[Snapshot]) -> Result<()> {
        let key = self.hist_key(job_id);
        let mut conn = self.conn.clone();

        if seq.is_empty() {
            let _: () = conn.del(&key).await?;
            let _: () = conn.srem(self.jobs_key(), job_id.as_str()).await?;
            return Ok(());
        }

        let mut lines = Vec::with_capacity(seq.len());
        for snap in seq {
            lines.push(serde_json::to_string(snap)?);
        }

        // DEL + RPUSH in one pipeline so readers never see an empty list
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key);
        for line in &lines {
            pipe.rpush(&key, line);
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn recent(&self, job_id: &JobId, n: usize) -> Result<Vec<Snapshot>> {
        self.load_recent(job_id, n as isize).await
    }

    async fn append(&self, job_id: &JobId, new: NewSnapshot) -> Result<Snapshot> {
        let _guard = self.write_lock.lock().await;
        let latest = self.load_recent(job_id, 1).await?;

        match classify_append(job_id, latest.first(), &new)? {
            AppendAction::Dedup => {
                let mut merged = latest.into_iter().next().ok_or_else(|| {
                    Error::store("dedup append resolved without a latest row")
                })?;
                merged.last_seen = merged.last_seen.max(new.timestamp);

                let mut conn = self.conn.clone();
                let line = serde_json::to_string(&merged)?;
                let _: () = conn.lset(self.hist_key(job_id), -1, line).await?;
                Ok(merged)
            }
            AppendAction::Insert => {
                let snapshot = new.into_snapshot(job_id);
                let line = serde_json::to_string(&snapshot)?;

                let mut conn = self.conn.clone();
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .rpush(self.hist_key(job_id), line)
                    .sadd(self.jobs_key(), job_id.as_str());
                let _: () = pipe.query_async(&mut conn).await?;
                Ok(snapshot)
            }
        }
    }

    async fn mark_seen(&self, job_id: &JobId, hash: &ContentHash, timestamp: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut seq = self.load_recent(job_id, isize::MAX).await?;
        seq.reverse(); // oldest first

        let Some(pos) = seq.iter().rposition(|s| s.hash() == Some(hash)) else {
            tracing::warn!(job_id = %job_id, hash = %hash, "mark_seen found no matching row");
            return Ok(());
        };
        seq[pos].last_seen = timestamp;

        let mut conn = self.conn.clone();
        let line = serde_json::to_string(&seq[pos])?;
        let _: () = conn.lset(self.hist_key(job_id), pos as isize, line).await?;
        Ok(())
    }

    async fn all_job_ids(&self) -> Result<HashSet<JobId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(self.jobs_key()).await?;
        Ok(members.into_iter().map(JobId::from_hex).collect())
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.conn.clone();
        let count: u64 = conn.llen(self.hist_key(job_id)).await?;
        self.rewrite(job_id, &[]).await?;
        Ok(count)
    }

    async fn trim(&self, job_id: &JobId, keep_distinct: usize) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut seq = self.load_recent(job_id, isize::MAX).await?;
        seq.reverse(); // oldest first

        let from = retain_from(&seq, keep_distinct);
        if from == 0 {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let _: () = conn
            .ltrim(self.hist_key(job_id), from as isize, -1)
            .await?;
        Ok(from as u64)
    }

    async fn rollback(&self, _cutoff: i64) -> Result<u64> {
        Err(Error::RollbackUnsupported { backend: "redis" })
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

// These need a live Redis instance; run with
// `cargo test --features redis -- --ignored` against a local server.
#[cfg(test)]
mod tests {
    use super::*;

    const TEST_URL: &str = "redis://127.0.0.1:6379";

    async fn fresh_store(prefix: &str) -> RedisStore {
        let store = RedisStore::connect(TEST_URL, Some(prefix)).await.unwrap();
        for job_id in store.all_job_ids().await.unwrap() {
            store.remove_job(&job_id).await.unwrap();
        }
        store
    }

    #[tokio::test]
    #[ignore]
    async fn append_and_recent_round_trip() {
        let store = fresh_store("snapwatch-test-rt").await;
        let job = JobId::derive("j");

        store.append(&job, NewSnapshot::content(10, "v1")).await.unwrap();
        store.append(&job, NewSnapshot::content(20, "v2")).await.unwrap();

        let recent = store.recent(&job, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content(), Some("v2"));
        assert_eq!(recent[1].content(), Some("v1"));
    }

    #[tokio::test]
    #[ignore]
    async fn rollback_is_refused() {
        let store = fresh_store("snapwatch-test-rb").await;
        let err = store.rollback(0).await.unwrap_err();
        assert!(matches!(err, Error::RollbackUnsupported { backend: "redis" }));
    }

    #[tokio::test]
    #[ignore]
    async fn dedup_updates_last_seen_in_place() {
        let store = fresh_store("snapwatch-test-dd").await;
        let job = JobId::derive("j");

        store.append(&job, NewSnapshot::content(10, "same")).await.unwrap();
        store.append(&job, NewSnapshot::content(25, "same")).await.unwrap();

        let recent = store.recent(&job, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].last_seen, 25);
    }
}
