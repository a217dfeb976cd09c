//! Job identity and per-job policy
//!
//! A job is the logical identity of a monitored source. It is materialized
//! fresh from the job list on every run and never persisted; only its id
//! appears in the store, as the key of the job's snapshot sequence.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::config::DiffConfig;
use crate::error::{AcquireError, Error, Result};

/// Stable job identity, derived from the job's defining parameters
/// (its location string), never from its position in the job list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the id from a location string
    pub fn derive(location: &str) -> Self {
        let digest = Sha256::digest(location.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Wrap an already-derived id (store deserialization, legacy migration)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which acquisition failures are suppressed from user-visible reporting.
///
/// Suppression is a reporting concern only: the detector records every
/// failed attempt as an error snapshot regardless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    /// Hide connection-level failures (DNS, refused, reset)
    #[serde(default)]
    pub ignore_connection_errors: bool,

    /// Hide timeouts
    #[serde(default)]
    pub ignore_timeout_errors: bool,

    /// Hide protocol statuses within any of these inclusive ranges
    #[serde(default)]
    pub ignored_status_ranges: Vec<StatusRange>,
}

/// Inclusive status range, e.g. 500-599
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    /// First suppressed status
    pub start: u16,
    /// Last suppressed status
    pub end: u16,
}

impl ErrorPolicy {
    /// Whether the policy hides this failure from the report
    pub fn suppresses(&self, err: &AcquireError) -> bool {
        match err {
            AcquireError::Connection(_) => self.ignore_connection_errors,
            AcquireError::Timeout(_) => self.ignore_timeout_errors,
            AcquireError::Status(code) => self
                .ignored_status_ranges
                .iter()
                .any(|r| (r.start..=r.end).contains(code)),
            _ => false,
        }
    }
}

/// A configured monitoring target.
///
/// Retrieval parameters stay opaque to the core: `location` is whatever the
/// acquisition collaborator understands, and is used here only for identity
/// derivation and report labels.
#[derive(Debug, Clone)]
pub struct Job {
    /// Human-readable name for reports
    pub name: String,
    /// Position in the current job list; used only for report ordering
    pub ordinal: usize,
    /// Stable identity
    pub id: JobId,
    /// Opaque retrieval descriptor (URL, command line, path)
    pub location: String,
    /// Acquisition timeout in seconds; 0 means unbounded
    pub timeout_secs: u64,
    /// Number of most-recent distinct-content snapshots considered as diff
    /// baselines
    pub comparison_depth: usize,
    /// Consecutive failures before an error becomes user-visible
    pub max_tries: u32,
    /// Whether acquisition is browser-class heavyweight; caps the worker
    /// pool to the number of processing units
    pub heavyweight: bool,
    /// Diff rendering configuration
    pub diff: DiffConfig,
    /// Error-visibility policy
    pub error_policy: ErrorPolicy,
}

impl Job {
    /// Create a job with default policies
    pub fn new(name: impl Into<String>, location: impl Into<String>, ordinal: usize) -> Self {
        let location = location.into();
        Self {
            name: name.into(),
            ordinal,
            id: JobId::derive(&location),
            location,
            timeout_secs: 0,
            comparison_depth: 1,
            max_tries: 1,
            heavyweight: false,
            diff: DiffConfig::default(),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Set the acquisition timeout (0 = unbounded)
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the comparison depth
    pub fn with_comparison_depth(mut self, depth: usize) -> Self {
        self.comparison_depth = depth;
        self
    }

    /// Set the failure count after which errors are reported
    pub fn with_max_tries(mut self, tries: u32) -> Self {
        self.max_tries = tries;
        self
    }

    /// Mark the job as heavyweight (browser-class acquisition)
    pub fn with_heavyweight(mut self, heavyweight: bool) -> Self {
        self.heavyweight = heavyweight;
        self
    }

    /// Set the diff configuration
    pub fn with_diff(mut self, diff: DiffConfig) -> Self {
        self.diff = diff;
        self
    }

    /// Set the error-visibility policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Acquisition timeout as a duration, `None` when unbounded
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Validate the job configuration.
    ///
    /// Runs before any acquisition begins; the message names the offending
    /// job so a misconfigured entry can be found in the job list.
    pub fn validate(&self) -> Result<()> {
        if self.location.is_empty() {
            return Err(Error::config(format!(
                "job '{}': location cannot be empty",
                self.name
            )));
        }
        if self.comparison_depth == 0 {
            return Err(Error::config(format!(
                "job '{}': comparison depth must be at least 1",
                self.name
            )));
        }
        if self.max_tries == 0 {
            return Err(Error::config(format!(
                "job '{}': max tries must be at least 1",
                self.name
            )));
        }
        for range in &self.error_policy.ignored_status_ranges {
            if range.start > range.end {
                return Err(Error::config(format!(
                    "job '{}': ignored status range {}-{} is inverted",
                    self.name, range.start, range.end
                )));
            }
        }
        self.diff.validate().map_err(|e| {
            Error::config(format!("job '{}': {}", self.name, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_derives_from_location_not_position() {
        let a = Job::new("a", "https://example.org", 0);
        let b = Job::new("b", "https://example.org", 7);
        assert_eq!(a.id, b.id);

        let c = Job::new("a", "https://example.org/other", 0);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let job = Job::new("j", "loc", 0);
        assert_eq!(job.timeout(), None);
        assert_eq!(
            job.with_timeout_secs(30).timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let job = Job::new("bad", "loc", 0).with_comparison_depth(0);
        let err = job.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn validate_rejects_inverted_status_range() {
        let mut job = Job::new("j", "loc", 0);
        job.error_policy.ignored_status_ranges.push(StatusRange {
            start: 599,
            end: 500,
        });
        assert!(job.validate().is_err());
    }

    #[test]
    fn policy_suppression_matches_kinds() {
        let policy = ErrorPolicy {
            ignore_connection_errors: true,
            ignore_timeout_errors: false,
            ignored_status_ranges: vec![StatusRange {
                start: 500,
                end: 599,
            }],
        };

        assert!(policy.suppresses(&AcquireError::connection("refused")));
        assert!(!policy.suppresses(&AcquireError::Timeout(5)));
        assert!(policy.suppresses(&AcquireError::Status(503)));
        assert!(!policy.suppresses(&AcquireError::Status(404)));
    }
}
