//! Change detection
//!
//! Turns an acquisition outcome into a verdict against stored history:
//! append the observation, pick the diff baseline, and decide whether the
//! result is user-visible. All history access goes through the snapshot
//! store; the detector holds no state of its own.

pub mod diff;

use chrono::{TimeZone, Utc};
use tracing::debug;

use crate::config::DiffMode;
use crate::error::{AcquireError, Result};
use crate::job::Job;
use crate::snapshot::{HistoryView, NewSnapshot, Snapshot};
use crate::traits::SnapshotStore;

/// Never load fewer than this many rows when building a history view;
/// repeated content means distinct candidates can be sparse.
const RECENT_WINDOW: usize = 50;

/// What an observation means relative to stored history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First content ever recorded for this job
    New,
    /// Content matches a stored candidate within the comparison depth
    Unchanged,
    /// Content differs from every candidate
    Changed,
    /// Acquisition failed
    Error,
}

/// Outcome of evaluating one observation
#[derive(Debug)]
pub struct Detection {
    pub verdict: Verdict,
    /// Rendered diff for `Changed` verdicts
    pub diff: Option<String>,
    /// The stored row this observation resolved to
    pub snapshot: Snapshot,
    /// Diff baseline for `Changed` verdicts
    pub baseline: Option<Snapshot>,
    /// Whether the outcome should be withheld from reports (expected errors
    /// below the failure threshold, ignored error classes)
    pub suppressed: bool,
}

/// Stateless evaluator over a snapshot store
pub struct ChangeDetector<'a> {
    store: &'a dyn SnapshotStore,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(store: &'a dyn SnapshotStore) -> Self {
        Self { store }
    }

    async fn history(&self, job: &Job) -> Result<HistoryView> {
        let window = job.comparison_depth.saturating_mul(4).max(RECENT_WINDOW);
        Ok(HistoryView::new(self.store.recent(&job.id, window).await?))
    }

    /// Evaluate one acquisition outcome at `timestamp` (epoch seconds)
    pub async fn evaluate(
        &self,
        job: &Job,
        outcome: std::result::Result<String, AcquireError>,
        timestamp: i64,
    ) -> Result<Detection> {
        let view = self.history(job).await?;

        match outcome {
            Ok(content) => self.evaluate_content(job, &view, content, timestamp).await,
            Err(err) => self.evaluate_error(job, &view, err, timestamp).await,
        }
    }

    async fn evaluate_content(
        &self,
        job: &Job,
        view: &HistoryView,
        content: String,
        timestamp: i64,
    ) -> Result<Detection> {
        let candidates = view.distinct_contents(job.comparison_depth);

        if candidates.is_empty() {
            let snapshot = self
                .store
                .append(&job.id, NewSnapshot::content(timestamp, content))
                .await?;
            debug!(job = %job.name, "first content for job");
            return Ok(Detection {
                verdict: Verdict::New,
                diff: None,
                snapshot,
                baseline: None,
                suppressed: false,
            });
        }

        let hash = crate::snapshot::ContentHash::of(&content);
        if let Some(matched) = candidates.iter().find(|c| c.hash() == Some(&hash)) {
            let is_latest = view.latest().map(|l| l.timestamp) == Some(matched.timestamp);
            let snapshot = if is_latest {
                // The dedup path advances last_seen on the latest row
                self.store
                    .append(&job.id, NewSnapshot::content(timestamp, content))
                    .await?
            } else {
                // Content reverted to an older candidate: refresh that row
                // without inserting a new one
                self.store.mark_seen(&job.id, &hash, timestamp).await?;
                let mut refreshed = (*matched).clone();
                refreshed.last_seen = timestamp;
                refreshed
            };
            return Ok(Detection {
                verdict: Verdict::Unchanged,
                diff: None,
                snapshot,
                baseline: None,
                suppressed: false,
            });
        }

        // Changed: baseline is the candidate with the smallest line diff,
        // most recent wins ties (candidates are most-recent-first, so only a
        // strictly smaller diff displaces the current choice)
        let mut baseline = candidates[0];
        let mut best_size = usize::MAX;
        for &candidate in &candidates {
            if let Some(old) = candidate.content() {
                let size = diff::diff_size(old, &content);
                if size < best_size {
                    best_size = size;
                    baseline = candidate;
                }
            }
        }
        let baseline = baseline.clone();

        let rendered = self.render_diff(job, &baseline, &content, timestamp).await?;
        let snapshot = self
            .store
            .append(&job.id, NewSnapshot::content(timestamp, content))
            .await?;

        debug!(
            job = %job.name,
            baseline_ts = baseline.timestamp,
            diff_size = best_size,
            "content changed"
        );
        Ok(Detection {
            verdict: Verdict::Changed,
            diff: Some(rendered),
            snapshot,
            baseline: Some(baseline),
            suppressed: false,
        })
    }

    async fn evaluate_error(
        &self,
        job: &Job,
        view: &HistoryView,
        err: AcquireError,
        timestamp: i64,
    ) -> Result<Detection> {
        let tries = view.latest_tries() + 1;
        let suppressed = job.error_policy.suppresses(&err) || tries < job.max_tries;

        let snapshot = self
            .store
            .append(&job.id, NewSnapshot::error(timestamp, tries, err.to_string()))
            .await?;

        debug!(job = %job.name, tries, suppressed, "acquisition failed: {}", err);
        Ok(Detection {
            verdict: Verdict::Error,
            diff: None,
            snapshot,
            baseline: None,
            suppressed,
        })
    }

    /// Diff the two newest distinct stored contents, without acquiring
    /// anything. `None` when fewer than two exist.
    pub async fn diff_stored(&self, job: &Job) -> Result<Option<String>> {
        let view = self.history(job).await?;
        let distinct = view.distinct_contents(2);
        let &[new, old] = distinct.as_slice() else {
            return Ok(None);
        };

        let Some(new_text) = new.content() else {
            return Ok(None);
        };
        let new_text = new_text.to_string();
        Ok(Some(self.render_diff(job, old, &new_text, new.timestamp).await?))
    }

    async fn render_diff(
        &self,
        job: &Job,
        baseline: &Snapshot,
        new_content: &str,
        timestamp: i64,
    ) -> Result<String> {
        let old_text = baseline.content().unwrap_or_default();
        let old_label = format!("{} @ {}", job.name, format_ts(baseline.timestamp));
        let new_label = format!("{} @ {}", job.name, format_ts(timestamp));

        let mut rendered = match &job.diff.tool {
            Some(tool) => diff::external_diff(tool, old_text, new_content).await?,
            None => diff::render_unified(
                old_text,
                new_content,
                &old_label,
                &new_label,
                job.diff.context_lines,
            ),
        };

        if job.diff.mode != DiffMode::Full {
            rendered = diff::filter_lines(&rendered, job.diff.mode);
        }

        if let Some(max) = job.diff.max_length {
            if rendered.len() > max {
                let mut cut = max;
                while !rendered.is_char_boundary(cut) {
                    cut -= 1;
                }
                rendered.truncate(cut);
                rendered.push_str("\n[diff truncated]\n");
            }
        }

        Ok(rendered)
    }
}

/// Epoch seconds as a human-readable UTC timestamp
fn format_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("@{}", ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn job() -> Job {
        Job::new("site", "https://example.org", 1)
    }

    #[tokio::test]
    async fn first_content_is_new() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);

        let d = detector.evaluate(&job(), Ok("v1".into()), 10).await.unwrap();
        assert_eq!(d.verdict, Verdict::New);
        assert!(d.diff.is_none());
        assert!(!d.suppressed);
    }

    #[tokio::test]
    async fn identical_content_is_unchanged() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job();

        detector.evaluate(&job, Ok("v1".into()), 10).await.unwrap();
        let d = detector.evaluate(&job, Ok("v1".into()), 20).await.unwrap();
        assert_eq!(d.verdict, Verdict::Unchanged);
        assert_eq!(d.snapshot.last_seen, 20);
        // No new row appended
        assert_eq!(store.recent(&job.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_content_is_changed_with_diff() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job();

        detector.evaluate(&job, Ok("a\nb\n".into()), 10).await.unwrap();
        let d = detector.evaluate(&job, Ok("a\nc\n".into()), 20).await.unwrap();

        assert_eq!(d.verdict, Verdict::Changed);
        let diff = d.diff.unwrap();
        assert!(diff.contains("-b"));
        assert!(diff.contains("+c"));
        assert_eq!(d.baseline.unwrap().timestamp, 10);
    }

    #[tokio::test]
    async fn depth_two_matches_older_candidate_as_unchanged() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job().with_comparison_depth(2);

        detector.evaluate(&job, Ok("v1".into()), 10).await.unwrap();
        detector.evaluate(&job, Ok("v2".into()), 20).await.unwrap();
        // Flapped back to v1: within depth 2, so not a change
        let d = detector.evaluate(&job, Ok("v1".into()), 30).await.unwrap();

        assert_eq!(d.verdict, Verdict::Unchanged);
        assert_eq!(d.snapshot.timestamp, 10);
        assert_eq!(d.snapshot.last_seen, 30);
        // History still has two rows; latest is still v2
        let recent = store.recent(&job.id, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content(), Some("v2"));
    }

    #[tokio::test]
    async fn depth_one_treats_flap_back_as_changed() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job();

        detector.evaluate(&job, Ok("v1".into()), 10).await.unwrap();
        detector.evaluate(&job, Ok("v2".into()), 20).await.unwrap();
        let d = detector.evaluate(&job, Ok("v1".into()), 30).await.unwrap();
        assert_eq!(d.verdict, Verdict::Changed);
    }

    #[tokio::test]
    async fn baseline_is_smallest_diff_most_recent_on_tie() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job().with_comparison_depth(3);

        detector
            .evaluate(&job, Ok("a\nb\nc\nd\n".into()), 10)
            .await
            .unwrap();
        detector
            .evaluate(&job, Ok("x\ny\nz\nw\n".into()), 20)
            .await
            .unwrap();
        // Close to the 10-snapshot, far from the 20-snapshot
        let d = detector
            .evaluate(&job, Ok("a\nb\nc\nQ\n".into()), 30)
            .await
            .unwrap();

        assert_eq!(d.verdict, Verdict::Changed);
        assert_eq!(d.baseline.unwrap().timestamp, 10);
    }

    #[tokio::test]
    async fn errors_accumulate_tries_and_respect_max_tries() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job().with_max_tries(3);

        detector.evaluate(&job, Ok("v1".into()), 10).await.unwrap();

        let d1 = detector
            .evaluate(&job, Err(AcquireError::Timeout(5)), 20)
            .await
            .unwrap();
        assert_eq!(d1.verdict, Verdict::Error);
        assert_eq!(d1.snapshot.tries, 1);
        assert!(d1.suppressed);

        let d2 = detector
            .evaluate(&job, Err(AcquireError::Timeout(5)), 30)
            .await
            .unwrap();
        assert_eq!(d2.snapshot.tries, 2);
        assert!(d2.suppressed);

        let d3 = detector
            .evaluate(&job, Err(AcquireError::Timeout(5)), 40)
            .await
            .unwrap();
        assert_eq!(d3.snapshot.tries, 3);
        assert!(!d3.suppressed);
    }

    #[tokio::test]
    async fn success_after_errors_resets_tries() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job();

        detector.evaluate(&job, Ok("v1".into()), 10).await.unwrap();
        detector
            .evaluate(&job, Err(AcquireError::connection("down")), 20)
            .await
            .unwrap();
        let d = detector.evaluate(&job, Ok("v1".into()), 30).await.unwrap();

        // Unchanged relative to the surviving content candidate
        assert_eq!(d.verdict, Verdict::Unchanged);
        let recent = store.recent(&job.id, 10).await.unwrap();
        assert_eq!(recent[0].tries, 1); // the error row is still latest
    }

    #[tokio::test]
    async fn ignored_error_classes_are_suppressed_even_past_max_tries() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let policy = crate::job::ErrorPolicy {
            ignore_connection_errors: true,
            ..Default::default()
        };
        let job = job().with_max_tries(1).with_error_policy(policy);

        let d = detector
            .evaluate(&job, Err(AcquireError::connection("down")), 10)
            .await
            .unwrap();
        assert_eq!(d.snapshot.tries, 1);
        assert!(d.suppressed);
    }

    #[tokio::test]
    async fn diff_stored_needs_two_distinct_contents() {
        let store = MemoryStore::new();
        let detector = ChangeDetector::new(&store);
        let job = job().with_comparison_depth(2);

        assert!(detector.diff_stored(&job).await.unwrap().is_none());

        detector.evaluate(&job, Ok("a\n".into()), 10).await.unwrap();
        assert!(detector.diff_stored(&job).await.unwrap().is_none());

        detector.evaluate(&job, Ok("b\n".into()), 20).await.unwrap();
        let diff = detector.diff_stored(&job).await.unwrap().unwrap();
        assert!(diff.contains("-a"));
        assert!(diff.contains("+b"));
    }
}
