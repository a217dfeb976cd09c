//! Snapshot data model
//!
//! A snapshot is one recorded observation of a monitored source: either the
//! filtered content that was acquired, or the error that prevented
//! acquisition. Snapshots are immutable once written; the only field a store
//! may touch afterwards is `last_seen`, and rows are only ever removed by
//! rollback or garbage collection, never rewritten.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::job::JobId;

/// Content-addressed identity of a snapshot's content.
///
/// Hex-encoded SHA-256 of the filtered content bytes. Used for equality,
/// dedup, and distinct-history reduction; error snapshots carry no hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the given content
    pub fn of(content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Wrap an already-computed hex digest (store deserialization)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a snapshot records: acquired content, or the acquisition failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Filtered content together with its content-addressed identity
    Content {
        /// The filtered content
        text: String,
        /// SHA-256 of `text`
        hash: ContentHash,
    },

    /// Acquisition or filtering failed; no content was recorded
    Error {
        /// Collaborator-reported failure message
        message: String,
    },
}

impl Payload {
    /// Build a content payload, computing the hash
    pub fn content(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = ContentHash::of(&text);
        Self::Content { text, hash }
    }

    /// Build an error payload
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One recorded observation for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Job this observation belongs to
    pub job_id: JobId,
    /// Acquisition time, epoch seconds; strictly increasing per job in
    /// insertion order
    pub timestamp: i64,
    /// Updated when an identical observation is recorded without creating a
    /// new row; equals `timestamp` at creation
    pub last_seen: i64,
    /// Consecutive acquisition failures up to and including this snapshot;
    /// zero for content snapshots
    pub tries: u32,
    /// Content or error
    pub payload: Payload,
}

impl Snapshot {
    /// Content hash, if this is a content snapshot
    pub fn hash(&self) -> Option<&ContentHash> {
        match &self.payload {
            Payload::Content { hash, .. } => Some(hash),
            Payload::Error { .. } => None,
        }
    }

    /// Content text, if this is a content snapshot
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            Payload::Content { text, .. } => Some(text),
            Payload::Error { .. } => None,
        }
    }

    /// Error message, if this is an error snapshot
    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            Payload::Error { message } => Some(message),
            Payload::Content { .. } => None,
        }
    }

    /// Whether this snapshot records a failure
    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error { .. })
    }
}

/// A not-yet-stored observation, input to [`SnapshotStore::append`]
///
/// [`SnapshotStore::append`]: crate::traits::SnapshotStore::append
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    /// Acquisition time, epoch seconds
    pub timestamp: i64,
    /// Consecutive-failure counter; zero for content
    pub tries: u32,
    /// Content or error
    pub payload: Payload,
}

impl NewSnapshot {
    /// A content observation (resets the failure counter)
    pub fn content(timestamp: i64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            tries: 0,
            payload: Payload::content(text),
        }
    }

    /// A failed observation
    pub fn error(timestamp: i64, tries: u32, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            tries,
            payload: Payload::error(message),
        }
    }

    /// Materialize into a stored snapshot for the given job
    pub fn into_snapshot(self, job_id: &JobId) -> Snapshot {
        Snapshot {
            job_id: job_id.clone(),
            timestamp: self.timestamp,
            last_seen: self.timestamp,
            tries: self.tries,
            payload: self.payload,
        }
    }
}

/// Most-recent-first view over a job's stored history.
///
/// Computed on read, never persisted. Provides the distinct-content
/// reduction the detector's multi-version comparison needs.
#[derive(Debug, Clone)]
pub struct HistoryView {
    snapshots: Vec<Snapshot>,
}

impl HistoryView {
    /// Wrap a most-recent-first sequence as returned by
    /// `SnapshotStore::recent`
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self { snapshots }
    }

    /// The newest stored snapshot, content or error
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    /// Consecutive-failure count as of the newest snapshot
    pub fn latest_tries(&self) -> u32 {
        self.latest().map(|s| s.tries).unwrap_or(0)
    }

    /// Whether any content-bearing snapshot exists
    pub fn has_content(&self) -> bool {
        self.snapshots.iter().any(|s| !s.is_error())
    }

    /// Up to `depth` content snapshots with distinct hashes,
    /// most-recent-first. Error snapshots are never candidates; repeated
    /// content counts once, at its most recent occurrence.
    pub fn distinct_contents(&self, depth: usize) -> Vec<&Snapshot> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for snap in &self.snapshots {
            if let Some(hash) = snap.hash() {
                if seen.insert(hash.clone()) {
                    out.push(snap);
                    if out.len() == depth {
                        break;
                    }
                }
            }
        }
        out
    }
}
