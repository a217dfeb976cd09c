//! Architectural Contract Test: Job Runner
//!
//! The runner must execute every job exactly once per pass, keep the report
//! in job-list order regardless of completion order, bound concurrency to
//! the worker pool size, and abort the run on store failures rather than
//! absorbing them.

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use snapwatch_core::traits::{ContentSource, SnapshotStore};
use snapwatch_core::{
    AcquireError, EntryStatus, Error, JobRunner, JobTask, MemoryStore, NewSnapshot, RunConfig,
    StoreConfig,
};

#[tokio::test]
async fn every_job_runs_once_and_the_report_is_ordered() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let mut sources = Vec::new();
    let mut tasks = Vec::new();

    for i in 1..=10 {
        let job = numbered_job(i);
        let source = if i == 5 {
            ScriptedSource::failing(&job.location, AcquireError::Status(500))
        } else {
            ScriptedSource::constant(&job.location, "content")
        };
        sources.push(Arc::clone(&source));
        tasks.push(JobTask::new(job, source));
    }

    let runner = JobRunner::new(Arc::clone(&store), RunConfig::new(StoreConfig::Memory));
    let report = runner.run(tasks).await.unwrap();

    let entries = report.entries();
    assert_eq!(entries.len(), 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.ordinal, i + 1);
        let expected = if i + 1 == 5 {
            EntryStatus::Error
        } else {
            EntryStatus::New
        };
        assert_eq!(entry.status, expected, "entry {}", i + 1);
    }

    for source in &sources {
        assert_eq!(source.fetch_count(), 1);
    }

    // The failure was recorded, not swallowed
    let failed = numbered_job(5);
    let recent = store.recent(&failed.id, 1).await.unwrap();
    assert!(recent[0].is_error());
    assert_eq!(recent[0].tries, 1);
}

/// Tracks how many fetches overlap
struct GaugeSource {
    location: String,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentSource for GaugeSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<String, AcquireError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok("content".to_string())
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_pool_size() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<JobTask> = (1..=12)
        .map(|i| {
            let job = numbered_job(i);
            let source = Arc::new(GaugeSource {
                location: job.location.clone(),
                active: Arc::clone(&active),
                peak: Arc::clone(&peak),
            });
            JobTask::new(job, source)
        })
        .collect();

    let mut config = RunConfig::new(StoreConfig::Memory);
    config.concurrency = Some(3);
    let runner = JobRunner::new(store, config);
    let report = runner.run(tasks).await.unwrap();

    assert_eq!(report.entries().len(), 12);
    assert!(peak.load(Ordering::SeqCst) <= 3, "peak {}", peak.load(Ordering::SeqCst));
}

#[tokio::test]
async fn store_corruption_aborts_the_run() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let job = numbered_job(1);
    let job_id = job.id.clone();

    // A snapshot from the future means a concurrent writer or clock damage;
    // the runner must surface it instead of recording around it
    let future = chrono::Utc::now().timestamp() + 1_000_000;
    store
        .append(&job_id, NewSnapshot::content(future, "future"))
        .await
        .unwrap();

    let source = ScriptedSource::constant(&job.location, "present");
    let runner = JobRunner::new(Arc::clone(&store), RunConfig::new(StoreConfig::Memory));
    let err = runner.run(vec![JobTask::new(job, source)]).await.unwrap_err();

    assert!(matches!(err, Error::OrderingViolation { .. }));
    // History is untouched
    let recent = store.recent(&job_id, 10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content(), Some("future"));
}

#[tokio::test]
async fn invalid_job_fails_fast_before_any_fetch() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let bad = numbered_job(1).with_comparison_depth(0);
    let good = numbered_job(2);
    let good_source = ScriptedSource::constant(&good.location, "content");

    let runner = JobRunner::new(store, RunConfig::new(StoreConfig::Memory));
    let err = runner
        .run(vec![
            JobTask::new(bad, ScriptedSource::constant("x", "y")),
            JobTask::new(good, good_source.clone()),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(good_source.fetch_count(), 0);
}
