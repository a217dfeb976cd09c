//! Flat-file snapshot store
//!
//! One text file per job under a directory: `<job_id>.jsonl`, one
//! JSON-serialized snapshot per line, oldest first. Appends go through a
//! single append-and-flush write; structural rewrites (trim, rollback,
//! mark_seen) use write-then-rename so readers never observe a torn file.
//!
//! This backend cannot guarantee per-job writer independence cheaply, so it
//! serializes all writes store-wide behind a mutex, which the contract
//! explicitly permits.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{classify_append, legacy, retain_from, AppendAction};
use crate::error::{Error, Result};
use crate::job::JobId;
use crate::snapshot::{ContentHash, NewSnapshot, Snapshot};
use crate::traits::SnapshotStore;

/// File name of the legacy single-file layout inside the store directory
const LEGACY_FILE: &str = "legacy.json";

/// Per-job flat-file snapshot store
#[derive(Debug)]
pub struct TextDirStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TextDirStore {
    /// Open (or create) a store directory
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            Error::store(format!("cannot create store directory {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn job_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", job_id))
    }

    /// Load a job's sequence, oldest first.
    ///
    /// A torn final line (interrupted append) is ignored; corruption
    /// anywhere else is a store error.
    async fn load(&self, job_id: &JobId) -> Result<Vec<Snapshot>> {
        let path = self.job_path(job_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::store(format!(
                    "cannot read history file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut snapshots = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Snapshot>(line) {
                Ok(snap) => snapshots.push(snap),
                Err(e) if i + 1 == lines.len() && !raw.ends_with('\n') => {
                    tracing::warn!(
                        path = %path.display(),
                        "ignoring torn trailing record: {}", e
                    );
                }
                Err(e) => {
                    return Err(Error::store(format!(
                        "corrupt history file {} at line {}: {}",
                        path.display(),
                        i + 1,
                        e
                    )))
                }
            }
        }
        Ok(snapshots)
    }

    /// Rewrite a job file atomically: write a temp file, then rename over
    /// the original. An empty sequence removes the file.
    async fn rewrite(&self, job_id: &JobId, seq: &[Snapshot]) -> Result<()> {
        let path = self.job_path(job_id);
        if seq.is_empty() {
            match fs::remove_file(&path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    return Err(Error::store(format!(
                        "cannot remove history file {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        let mut buf = String::new();
        for snap in seq {
            buf.push_str(&serde_json::to_string(snap)?);
            buf.push('\n');
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, buf.as_bytes()).await.map_err(|e| {
            Error::store(format!("cannot write temp file {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).await.map_err(|e| {
            Error::store(format!(
                "cannot rename {} to {}: {}",
                tmp.display(),
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn append_line(&self, job_id: &JobId, snapshot: &Snapshot) -> Result<()> {
        let path = self.job_path(job_id);
        let mut line = serde_json::to_string(snapshot)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                Error::store(format!("cannot open history file {}: {}", path.display(), e))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            Error::store(format!("cannot append to {}: {}", path.display(), e))
        })?;
        file.flush().await.map_err(|e| {
            Error::store(format!("cannot flush {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for TextDirStore {
    async fn recent(&self, job_id: &JobId, n: usize) -> Result<Vec<Snapshot>> {
        let seq = self.load(job_id).await?;
        Ok(seq.into_iter().rev().take(n).collect())
    }

    async fn append(&self, job_id: &JobId, new: NewSnapshot) -> Result<Snapshot> {
        let _guard = self.write_lock.lock().await;
        let mut seq = self.load(job_id).await?;

        match classify_append(job_id, seq.last(), &new)? {
            AppendAction::Dedup => {
                let last = seq.last_mut().ok_or_else(|| {
                    Error::store("dedup append resolved without a latest row")
                })?;
                last.last_seen = last.last_seen.max(new.timestamp);
                let merged = last.clone();
                self.rewrite(job_id, &seq).await?;
                Ok(merged)
            }
            AppendAction::Insert => {
                let snapshot = new.into_snapshot(job_id);
                self.append_line(job_id, &snapshot).await?;
                Ok(snapshot)
            }
        }
    }

    async fn mark_seen(&self, job_id: &JobId, hash: &ContentHash, timestamp: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut seq = self.load(job_id).await?;
        let Some(snap) = seq.iter_mut().rev().find(|s| s.hash() == Some(hash)) else {
            tracing::warn!(job_id = %job_id, hash = %hash, "mark_seen found no matching row");
            return Ok(());
        };
        snap.last_seen = timestamp;
        self.rewrite(job_id, &seq).await
    }

    async fn all_job_ids(&self) -> Result<HashSet<JobId>> {
        let mut ids = HashSet::new();
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            Error::store(format!("cannot read store directory {}: {}", self.dir.display(), e))
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            Error::store(format!("cannot read store directory {}: {}", self.dir.display(), e))
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.insert(JobId::from_hex(stem));
                }
            }
        }
        Ok(ids)
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let count = self.load(job_id).await?.len() as u64;
        if count > 0 {
            self.rewrite(job_id, &[]).await?;
        }
        Ok(count)
    }

    async fn trim(&self, job_id: &JobId, keep_distinct: usize) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut seq = self.load(job_id).await?;
        let from = retain_from(&seq, keep_distinct);
        if from == 0 {
            return Ok(0);
        }
        seq.drain(..from);
        self.rewrite(job_id, &seq).await?;
        Ok(from as u64)
    }

    async fn rollback(&self, cutoff: i64) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0u64;
        for job_id in self.all_job_ids().await? {
            let mut seq = self.load(&job_id).await?;
            let before = seq.len();
            seq.retain(|s| s.timestamp <= cutoff);
            if seq.len() != before {
                removed += (before - seq.len()) as u64;
                self.rewrite(&job_id, &seq).await?;
            }
        }
        Ok(removed)
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        legacy::migrate_file(self, &self.dir.join(LEGACY_FILE)).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "textdir"
    }
}
