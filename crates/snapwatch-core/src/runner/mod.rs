//! Concurrent job execution
//!
//! The runner drives one monitoring pass: every configured job is acquired,
//! filtered, evaluated against history, and folded into an ordered
//! [`RunReport`]. Jobs run on a bounded worker pool; per-job acquisition
//! failures become error snapshots, while store failures abort the run.
//!
//! ## Flow
//!
//! 1. Size the worker pool from the job list and configuration
//! 2. For each job: acquire a pool slot (or mark the job not-run once the
//!    run deadline expires), then spawn its task
//! 3. Each task fetches through the job's [`ContentSource`], applies its
//!    filter chain, and hands the outcome to the [`ChangeDetector`]
//! 4. Collect every outcome and assemble the report in job-list order
//!
//! [`ContentSource`]: crate::traits::ContentSource
//! [`ChangeDetector`]: crate::detector::ChangeDetector

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::detector::ChangeDetector;
use crate::error::{AcquireError, Error, Result};
use crate::job::Job;
use crate::report::{EntryStatus, ReportEntry, RunReport};
use crate::traits::{ContentFilter, ContentSource, SnapshotStore};

/// Hard cap on the derived pool size
const MAX_DEFAULT_WORKERS: usize = 32;

/// A job bound to its acquisition and filtering collaborators
pub struct JobTask {
    pub job: Job,
    pub source: Arc<dyn ContentSource>,
    pub filters: Vec<Arc<dyn ContentFilter>>,
}

impl JobTask {
    pub fn new(job: Job, source: Arc<dyn ContentSource>) -> Self {
        Self {
            job,
            source,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Arc<dyn ContentFilter>>) -> Self {
        self.filters = filters;
        self
    }
}

/// Executes one monitoring pass over a job list
pub struct JobRunner {
    store: Arc<dyn SnapshotStore>,
    config: RunConfig,
}

impl JobRunner {
    pub fn new(store: Arc<dyn SnapshotStore>, config: RunConfig) -> Self {
        Self { store, config }
    }

    /// Worker pool size: an explicit override wins; otherwise processing
    /// units plus I/O headroom, capped, and clamped to the number of
    /// processing units when any job is heavyweight.
    fn pool_size(&self, tasks: &[JobTask]) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        if let Some(n) = self.config.concurrency {
            return n.max(1);
        }

        let derived = (cpus + 4).min(MAX_DEFAULT_WORKERS);
        if tasks.iter().any(|t| t.job.heavyweight) {
            derived.min(cpus)
        } else {
            derived
        }
        .max(1)
    }

    /// Run every job once and assemble the report.
    ///
    /// Store failures (including ordering violations) abort the run; they
    /// indicate a concurrent writer or corruption, not a flaky source.
    pub async fn run(&self, tasks: Vec<JobTask>) -> Result<RunReport> {
        for task in &tasks {
            task.job.validate()?;
        }

        let workers = self.pool_size(&tasks);
        let deadline = self
            .config
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        info!(jobs = tasks.len(), workers, "starting run");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join_set: JoinSet<Result<ReportEntry>> = JoinSet::new();
        let mut entries = Vec::with_capacity(tasks.len());

        for task in tasks {
            let permit = match deadline {
                Some(d) if Instant::now() >= d => None,
                Some(d) => tokio::select! {
                    permit = Arc::clone(&semaphore).acquire_owned() => Some(permit),
                    _ = tokio::time::sleep_until(d) => None,
                },
                None => Some(Arc::clone(&semaphore).acquire_owned().await),
            };

            let Some(permit) = permit else {
                warn!(job = %task.job.name, "run deadline expired before job started");
                entries.push(ReportEntry {
                    ordinal: task.job.ordinal,
                    job_name: task.job.name.clone(),
                    location: task.job.location.clone(),
                    status: EntryStatus::NotRun,
                    detail: None,
                    suppressed: false,
                });
                continue;
            };
            let permit = permit.map_err(|_| Error::store("worker pool closed"))?;

            let store = Arc::clone(&self.store);
            join_set.spawn(async move {
                let _permit = permit;
                execute_task(store.as_ref(), task).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let entry = joined
                .map_err(|e| Error::store(format!("job task panicked: {}", e)))??;
            entries.push(entry);
        }

        let report = RunReport::new(entries);
        info!(noteworthy = report.is_noteworthy(), "run finished");
        Ok(report)
    }
}

/// Fetch, filter, and evaluate a single job
async fn execute_task(store: &dyn SnapshotStore, task: JobTask) -> Result<ReportEntry> {
    let job = &task.job;
    debug!(job = %job.name, location = %job.location, "running job");

    let outcome = match job.timeout() {
        Some(limit) => match tokio::time::timeout(limit, task.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(AcquireError::Timeout(job.timeout_secs)),
        },
        None => task.source.fetch().await,
    };

    let outcome = outcome.and_then(|content| {
        task.filters
            .iter()
            .try_fold(content, |content, filter| filter.apply(content))
    });

    let detector = ChangeDetector::new(store);
    let timestamp = Utc::now().timestamp();
    let detection = detector.evaluate(job, outcome, timestamp).await?;

    let detail = match detection.verdict {
        crate::detector::Verdict::Changed => detection.diff,
        crate::detector::Verdict::Error => detection.snapshot.error().map(String::from),
        _ => None,
    };

    Ok(ReportEntry {
        ordinal: job.ordinal,
        job_name: job.name.clone(),
        location: job.location.clone(),
        status: detection.verdict.into(),
        detail,
        suppressed: detection.suppressed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct StaticSource {
        location: String,
        result: std::result::Result<String, AcquireError>,
    }

    impl StaticSource {
        fn ok(location: &str, content: &str) -> Arc<Self> {
            Arc::new(Self {
                location: location.to_string(),
                result: Ok(content.to_string()),
            })
        }

        fn err(location: &str, err: AcquireError) -> Arc<Self> {
            Arc::new(Self {
                location: location.to_string(),
                result: Err(err),
            })
        }
    }

    #[async_trait]
    impl ContentSource for StaticSource {
        fn location(&self) -> &str {
            &self.location
        }

        async fn fetch(&self) -> std::result::Result<String, AcquireError> {
            self.result.clone()
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ContentSource for SlowSource {
        fn location(&self) -> &str {
            "slow://"
        }

        async fn fetch(&self) -> std::result::Result<String, AcquireError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn runner(store: Arc<dyn SnapshotStore>) -> JobRunner {
        JobRunner::new(store, RunConfig::new(StoreConfig::Memory))
    }

    #[tokio::test]
    async fn runs_every_job_and_orders_the_report() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let tasks: Vec<JobTask> = (1..=5)
            .map(|i| {
                let location = format!("https://example.org/{}", i);
                JobTask::new(
                    Job::new(format!("job-{}", i), &location, i),
                    StaticSource::ok(&location, "content"),
                )
            })
            .collect();

        let report = runner(Arc::clone(&store)).run(tasks).await.unwrap();
        let entries = report.entries();
        assert_eq!(entries.len(), 5);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.ordinal, i + 1);
            assert_eq!(entry.status, EntryStatus::New);
        }
    }

    #[tokio::test]
    async fn acquisition_failure_becomes_error_entry() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let job = Job::new("bad", "https://example.org/bad", 1);
        let job_id = job.id.clone();
        let tasks = vec![JobTask::new(
            job,
            StaticSource::err("https://example.org/bad", AcquireError::Status(500)),
        )];

        let report = runner(Arc::clone(&store)).run(tasks).await.unwrap();
        assert_eq!(report.entries()[0].status, EntryStatus::Error);

        // The failure was recorded as an error snapshot
        let recent = store.recent(&job_id, 1).await.unwrap();
        assert_eq!(recent[0].tries, 1);
        assert!(recent[0].is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn per_job_timeout_maps_to_timeout_error() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let job = Job::new("slow", "slow://", 1).with_timeout_secs(2);
        let tasks = vec![JobTask::new(job, Arc::new(SlowSource))];

        let report = runner(store).run(tasks).await.unwrap();
        let entry = &report.entries()[0];
        assert_eq!(entry.status, EntryStatus::Error);
        assert!(entry.detail.as_deref().unwrap_or_default().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_marks_jobs_not_run() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let mut config = RunConfig::new(StoreConfig::Memory);
        config.deadline_secs = Some(0);
        let runner = JobRunner::new(store, config);

        let tasks = vec![JobTask::new(
            Job::new("late", "https://example.org", 1),
            StaticSource::ok("https://example.org", "content"),
        )];
        let report = runner.run(tasks).await.unwrap();
        assert_eq!(report.entries()[0].status, EntryStatus::NotRun);
    }

    #[tokio::test]
    async fn filter_failure_is_recorded_not_fatal() {
        struct FailingFilter;
        impl ContentFilter for FailingFilter {
            fn name(&self) -> &str {
                "failing"
            }
            fn apply(&self, _content: String) -> std::result::Result<String, AcquireError> {
                Err(AcquireError::filter("failing", "no match"))
            }
        }

        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let tasks = vec![JobTask::new(
            Job::new("filtered", "https://example.org", 1),
            StaticSource::ok("https://example.org", "content"),
        )
        .with_filters(vec![Arc::new(FailingFilter)])];

        let report = runner(store).run(tasks).await.unwrap();
        let entry = &report.entries()[0];
        assert_eq!(entry.status, EntryStatus::Error);
        assert!(entry.detail.as_deref().unwrap_or_default().contains("failing"));
    }
}
