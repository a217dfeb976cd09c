//! Legacy on-disk schema detection and migration
//!
//! The version-1 layout kept all history in a single JSON file: a map from
//! job id to its full record list. Migration carries over only the latest
//! record per job, skips jobs the current store already knows, and leaves
//! the legacy file in place for manual removal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::job::JobId;
use crate::snapshot::NewSnapshot;
use crate::traits::SnapshotStore;

/// Schema version of the legacy single-file layout
const LEGACY_VERSION: u32 = 1;

/// The legacy single-file layout
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LegacyFile {
    /// Schema version marker; must be 1
    pub version: u32,
    /// Job id → oldest-first record list
    pub jobs: HashMap<String, Vec<LegacyRecord>>,
}

/// One record of the legacy layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LegacyRecord {
    /// Acquisition time, epoch seconds
    pub timestamp: i64,
    /// Filtered content
    pub content: String,
}

/// Load the legacy file, `None` when absent
pub(crate) fn load_legacy(path: &Path) -> Result<Option<LegacyFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::migration(format!("cannot read legacy file {}: {}", path.display(), e)))?;
    let legacy: LegacyFile = serde_json::from_str(&raw)
        .map_err(|e| Error::migration(format!("cannot parse legacy file {}: {}", path.display(), e)))?;

    if legacy.version != LEGACY_VERSION {
        return Err(Error::migration(format!(
            "legacy file {} has unsupported version {}",
            path.display(),
            legacy.version
        )));
    }

    Ok(Some(legacy))
}

/// Migrate the legacy file at `path` into `store`.
///
/// Idempotent: jobs already present in the store are skipped, so a second
/// invocation migrates zero jobs. The legacy file is never modified.
pub(crate) async fn migrate_file<S>(store: &S, path: &Path) -> Result<usize>
where
    S: SnapshotStore + ?Sized,
{
    let Some(legacy) = load_legacy(path)? else {
        tracing::debug!(path = %path.display(), "no legacy file, nothing to migrate");
        return Ok(0);
    };

    let existing = store.all_job_ids().await?;
    let mut migrated = 0;

    for (job_key, records) in &legacy.jobs {
        let job_id = JobId::from_hex(job_key.clone());
        if existing.contains(&job_id) {
            tracing::debug!(job_id = %job_id, "job already migrated, skipping");
            continue;
        }

        let Some(latest) = records.iter().max_by_key(|r| r.timestamp) else {
            continue;
        };

        store
            .append(
                &job_id,
                NewSnapshot::content(latest.timestamp, latest.content.clone()),
            )
            .await?;
        migrated += 1;
    }

    if migrated > 0 {
        tracing::info!(
            path = %path.display(),
            migrated,
            "migrated legacy history; legacy file left in place"
        );
    }

    Ok(migrated)
}
