//! SQLite snapshot store, the default backend
//!
//! One `snapshots` row per observation, keyed by `(job_id, timestamp)`, plus
//! a `meta` table carrying the schema version. All writes run inside
//! transactions over a single-connection pool, which serializes them and
//! makes the ordering check race-free.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{classify_append, legacy, retain_from, AppendAction};
use crate::error::{Error, Result};
use crate::job::JobId;
use crate::snapshot::{ContentHash, NewSnapshot, Payload, Snapshot};
use crate::traits::SnapshotStore;

/// Current on-disk schema version
const SCHEMA_VERSION: i64 = 2;

const CREATE_SNAPSHOTS: &str = "\
CREATE TABLE IF NOT EXISTS snapshots (
    job_id       TEXT    NOT NULL,
    timestamp    INTEGER NOT NULL,
    last_seen    INTEGER NOT NULL,
    tries        INTEGER NOT NULL,
    content      TEXT,
    content_hash TEXT,
    error        TEXT,
    PRIMARY KEY (job_id, timestamp)
)";

const CREATE_META: &str = "\
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

/// SQLite-backed snapshot store
pub struct SqliteStore {
    pool: SqlitePool,
    /// Where a version-1 single-file layout would live, for migration
    legacy_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            legacy_path: Some(path.with_extension("legacy.json")),
        };
        store.init().await?;
        Ok(store)
    }

    /// Open an in-memory database, for tests
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            pool,
            legacy_path: None,
        };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_SNAPSHOTS).execute(&self.pool).await?;
        sqlx::query(CREATE_META).execute(&self.pool).await?;

        let version: Option<i64> = sqlx::query("SELECT value FROM meta WHERE key = 'schema_version'")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| {
                row.get::<String, _>(0)
                    .parse::<i64>()
                    .map_err(|e| Error::store(format!("corrupt schema_version: {}", e)))
            })
            .transpose()?;

        match version {
            None => {
                sqlx::query("INSERT INTO meta (key, value) VALUES ('schema_version', ?1)")
                    .bind(SCHEMA_VERSION.to_string())
                    .execute(&self.pool)
                    .await?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                return Err(Error::store(format!(
                    "database schema version {} is not supported (expected {})",
                    v, SCHEMA_VERSION
                )));
            }
        }
        Ok(())
    }

    fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<Snapshot> {
        let job_id: String = row.get("job_id");
        let timestamp: i64 = row.get("timestamp");
        let last_seen: i64 = row.get("last_seen");
        let tries: i64 = row.get("tries");
        let content: Option<String> = row.get("content");
        let content_hash: Option<String> = row.get("content_hash");
        let error: Option<String> = row.get("error");

        let payload = match (content, content_hash, error) {
            (Some(text), Some(hash), None) => Payload::Content {
                text,
                hash: ContentHash::from_hex(hash),
            },
            (None, None, Some(message)) => Payload::Error { message },
            _ => {
                return Err(Error::store(format!(
                    "inconsistent snapshot row for job {} at {}",
                    job_id, timestamp
                )))
            }
        };

        Ok(Snapshot {
            job_id: JobId::from_hex(job_id),
            timestamp,
            last_seen,
            tries: tries as u32,
            payload,
        })
    }

    async fn load_recent_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        job_id: &JobId,
        n: i64,
    ) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT job_id, timestamp, last_seen, tries, content, content_hash, error
             FROM snapshots WHERE job_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(job_id.as_str())
        .bind(n)
        .fetch_all(&mut **tx)
        .await?;
        rows.iter().map(Self::row_to_snapshot).collect()
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn recent(&self, job_id: &JobId, n: usize) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT job_id, timestamp, last_seen, tries, content, content_hash, error
             FROM snapshots WHERE job_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(job_id.as_str())
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_snapshot).collect()
    }

    async fn append(&self, job_id: &JobId, new: NewSnapshot) -> Result<Snapshot> {
        let mut tx = self.pool.begin().await?;
        let latest = Self::load_recent_tx(&mut tx, job_id, 1).await?;

        let snapshot = match classify_append(job_id, latest.first(), &new)? {
            AppendAction::Dedup => {
                let mut merged = latest.into_iter().next().ok_or_else(|| {
                    Error::store("dedup append resolved without a latest row")
                })?;
                merged.last_seen = merged.last_seen.max(new.timestamp);
                sqlx::query(
                    "UPDATE snapshots SET last_seen = ?1 WHERE job_id = ?2 AND timestamp = ?3",
                )
                .bind(merged.last_seen)
                .bind(job_id.as_str())
                .bind(merged.timestamp)
                .execute(&mut *tx)
                .await?;
                merged
            }
            AppendAction::Insert => {
                let snapshot = new.into_snapshot(job_id);
                let (content, hash, error) = match &snapshot.payload {
                    Payload::Content { text, hash } => {
                        (Some(text.as_str()), Some(hash.as_str()), None)
                    }
                    Payload::Error { message } => (None, None, Some(message.as_str())),
                };
                sqlx::query(
                    "INSERT INTO snapshots
                     (job_id, timestamp, last_seen, tries, content, content_hash, error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(job_id.as_str())
                .bind(snapshot.timestamp)
                .bind(snapshot.last_seen)
                .bind(snapshot.tries as i64)
                .bind(content)
                .bind(hash)
                .bind(error)
                .execute(&mut *tx)
                .await?;
                snapshot
            }
        };

        tx.commit().await?;
        Ok(snapshot)
    }

    async fn mark_seen(&self, job_id: &JobId, hash: &ContentHash, timestamp: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE snapshots SET last_seen = ?1
             WHERE job_id = ?2 AND timestamp = (
                 SELECT MAX(timestamp) FROM snapshots
                 WHERE job_id = ?2 AND content_hash = ?3
             )",
        )
        .bind(timestamp)
        .bind(job_id.as_str())
        .bind(hash.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(job_id = %job_id, hash = %hash, "mark_seen found no matching row");
        }
        Ok(())
    }

    async fn all_job_ids(&self) -> Result<HashSet<JobId>> {
        let rows = sqlx::query("SELECT DISTINCT job_id FROM snapshots")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| JobId::from_hex(row.get::<String, _>(0)))
            .collect())
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snapshots WHERE job_id = ?1")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn trim(&self, job_id: &JobId, keep_distinct: usize) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut seq = Self::load_recent_tx(&mut tx, job_id, i64::MAX).await?;
        seq.reverse(); // oldest first

        let from = retain_from(&seq, keep_distinct);
        if from == 0 {
            tx.commit().await?;
            return Ok(0);
        }

        let result = if from >= seq.len() {
            sqlx::query("DELETE FROM snapshots WHERE job_id = ?1")
                .bind(job_id.as_str())
                .execute(&mut *tx)
                .await?
        } else {
            sqlx::query("DELETE FROM snapshots WHERE job_id = ?1 AND timestamp < ?2")
                .bind(job_id.as_str())
                .bind(seq[from].timestamp)
                .execute(&mut *tx)
                .await?
        };
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn rollback(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snapshots WHERE timestamp > ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        match &self.legacy_path {
            Some(path) => legacy::migrate_file(self, path).await,
            None => Ok(0),
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
