//! Snapshot store backends
//!
//! Four backends satisfy the [`SnapshotStore`] contract:
//!
//! - [`SqliteStore`]: embedded relational file, the default
//! - [`TextDirStore`]: flat per-job text files under a directory
//! - [`RedisStore`]: remote key-value service (feature `redis`)
//! - [`MemoryStore`]: in-memory, for tests and dry runs
//!
//! Backend selection happens once, from an explicit [`StoreConfig`] value.
//!
//! [`SnapshotStore`]: crate::traits::SnapshotStore
//! [`StoreConfig`]: crate::config::StoreConfig

mod legacy;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod textdir;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use textdir::TextDirStore;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::job::JobId;
use crate::snapshot::{NewSnapshot, Payload, Snapshot};
use crate::traits::SnapshotStore;

/// Open the backend selected by the configuration
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn SnapshotStore>> {
    match config {
        #[cfg(feature = "sqlite")]
        StoreConfig::Sqlite { path } => Ok(Box::new(SqliteStore::open(path).await?)),
        #[cfg(not(feature = "sqlite"))]
        StoreConfig::Sqlite { .. } => Err(Error::config(
            "sqlite backend selected but the 'sqlite' feature is not enabled",
        )),
        StoreConfig::TextDir { dir } => Ok(Box::new(TextDirStore::open(dir).await?)),
        #[cfg(feature = "redis")]
        StoreConfig::Redis { url, key_prefix } => {
            Ok(Box::new(RedisStore::connect(url, key_prefix.as_deref()).await?))
        }
        #[cfg(not(feature = "redis"))]
        StoreConfig::Redis { .. } => Err(Error::config(
            "redis backend selected but the 'redis' feature is not enabled",
        )),
        StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
    }
}

/// What an append resolves to under the dedup policy
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AppendAction {
    /// Content hash matches the latest row back-to-back: advance its
    /// `last_seen` instead of inserting
    Dedup,
    /// Insert a fresh row
    Insert,
}

/// Shared append validation: ordering check plus the back-to-back dedup
/// special case, identical across backends.
pub(crate) fn classify_append(
    job_id: &JobId,
    latest: Option<&Snapshot>,
    new: &NewSnapshot,
) -> Result<AppendAction> {
    let Some(last) = latest else {
        return Ok(AppendAction::Insert);
    };

    if let (Payload::Content { hash, .. }, Some(last_hash)) = (&new.payload, last.hash()) {
        if hash == last_hash {
            return Ok(AppendAction::Dedup);
        }
    }

    if new.timestamp <= last.timestamp {
        return Err(Error::OrderingViolation {
            job_id: job_id.clone(),
            attempted: new.timestamp,
            latest: last.timestamp,
        });
    }

    Ok(AppendAction::Insert)
}

/// Index into an oldest-first sequence from which rows are retained when
/// trimming to `keep_distinct` distinct content hashes. Error rows newer
/// than the retained window are kept; everything older is dropped.
pub(crate) fn retain_from(seq: &[Snapshot], keep_distinct: usize) -> usize {
    if keep_distinct == 0 {
        return seq.len();
    }
    let mut distinct = std::collections::HashSet::new();
    for (i, snap) in seq.iter().enumerate().rev() {
        match snap.hash() {
            Some(hash) => {
                if distinct.len() >= keep_distinct && !distinct.contains(hash) {
                    return i + 1;
                }
                distinct.insert(hash.clone());
            }
            None => {
                if distinct.len() >= keep_distinct {
                    return i + 1;
                }
            }
        }
    }
    0
}
