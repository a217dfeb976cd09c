// # snapwatch - change monitoring CLI
//
// The snapwatch binary is a thin integration layer over snapwatch-core:
// it parses the command line, loads the job file, opens the selected
// snapshot store backend, and dispatches to the core library. All
// monitoring logic lives in snapwatch-core.
//
// ## Commands
//
// - `run` (default): acquire every job once and report changes
// - `gc`: drop histories of jobs no longer in the job file, trim the rest
// - `clean`: trim excess history for the configured jobs
// - `rollback --to <time>`: discard snapshots newer than a point in time
// - `test-diff <job>`: diff the two newest stored versions of one job
// - `migrate`: import history from the legacy single-file layout
//
// ## Example
//
// ```bash
// snapwatch --jobs jobs.yaml --database watch.db run
// snapwatch --backend textdir --database ./history gc
// snapwatch rollback --to 2026-08-01T00:00:00Z
// ```

mod filters;
mod jobs;
mod reporter;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use snapwatch_core::traits::Reporter;
use snapwatch_core::{
    open_store, ChangeDetector, JobRunner, ReportConfig, RetentionManager, RunConfig, StoreConfig,
};

use crate::jobs::JobFile;
use crate::reporter::StdoutReporter;

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum CliExitCode {
    /// Clean exit
    Success = 0,
    /// Configuration or job-file error
    ConfigError = 1,
    /// Runtime error (store failure, worker panic)
    RuntimeError = 2,
}

impl From<CliExitCode> for ExitCode {
    fn from(code: CliExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "snapwatch", version, about = "Watch sources for content changes")]
struct Cli {
    /// Job file (YAML)
    #[arg(long, global = true, default_value = "jobs.yaml")]
    jobs: PathBuf,

    /// Snapshot store backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Sqlite)]
    backend: Backend,

    /// Database file (sqlite) or directory (textdir)
    #[arg(long, global = true, default_value = "snapwatch.db")]
    database: PathBuf,

    /// Redis connection URL (redis backend)
    #[arg(long, global = true, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Sqlite,
    Textdir,
    Redis,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Acquire every job once and report changes (the default)
    Run {
        /// Worker pool size override
        #[arg(long)]
        max_workers: Option<usize>,

        /// Overall run deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Maximum rendered report length in bytes
        #[arg(long)]
        max_report_length: Option<usize>,

        /// Include unchanged jobs in the report
        #[arg(long)]
        show_unchanged: bool,
    },

    /// Remove histories of unconfigured jobs and trim the rest
    Gc,

    /// Trim excess history for the configured jobs
    Clean,

    /// Discard snapshots newer than a point in time
    Rollback {
        /// Cutoff: epoch seconds or an RFC 3339 timestamp
        #[arg(long)]
        to: String,
    },

    /// Diff the two newest stored versions of one job (name or 1-based index)
    TestDiff { job: String },

    /// Import history from the legacy single-file layout
    Migrate,
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        let database = self.database.to_string_lossy().into_owned();
        match self.backend {
            Backend::Sqlite => StoreConfig::Sqlite { path: database },
            Backend::Textdir => StoreConfig::TextDir { dir: database },
            Backend::Redis => StoreConfig::Redis {
                url: self.redis_url.clone(),
                key_prefix: None,
            },
        }
    }
}

/// Parse a rollback cutoff: epoch seconds or RFC 3339
fn parse_cutoff(raw: &str) -> Result<i64> {
    if let Ok(epoch) = raw.parse::<i64>() {
        return Ok(epoch);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .with_context(|| format!("'{}' is neither epoch seconds nor an RFC 3339 timestamp", raw))
}

async fn execute(cli: Cli, job_file: JobFile) -> Result<()> {
    let store_config = cli.store_config();
    let store = open_store(&store_config).await?;

    let command = cli.command.unwrap_or(Command::Run {
        max_workers: None,
        deadline: None,
        max_report_length: None,
        show_unchanged: false,
    });

    let result = match command {
        Command::Run {
            max_workers,
            deadline,
            max_report_length,
            show_unchanged,
        } => {
            let mut config = RunConfig::new(store_config);
            config.concurrency = max_workers;
            config.deadline_secs = deadline;
            config.report = ReportConfig {
                max_length: max_report_length,
                show_unchanged,
            };
            config.validate()?;

            let tasks = jobs::build_tasks(&job_file)?;
            let report_config = config.report.clone();
            let store: Arc<dyn snapwatch_core::SnapshotStore> = Arc::from(store);
            let runner = JobRunner::new(Arc::clone(&store), config);
            let report = runner.run(tasks).await?;
            StdoutReporter::new(report_config).deliver(&report).await?;
            store.close().await?;
            return Ok(());
        }
        Command::Gc => {
            let jobs = jobs::jobs_only(&job_file);
            let stats = RetentionManager::new(store.as_ref())
                .garbage_collect(&jobs)
                .await?;
            println!(
                "removed {} job histories, trimmed {} snapshots",
                stats.removed_jobs, stats.removed_snapshots
            );
            Ok(())
        }
        Command::Clean => {
            let jobs = jobs::jobs_only(&job_file);
            let removed = RetentionManager::new(store.as_ref()).clean(&jobs).await?;
            println!("removed {} snapshots", removed);
            Ok(())
        }
        Command::Rollback { to } => {
            let cutoff = parse_cutoff(&to)?;
            let removed = RetentionManager::new(store.as_ref())
                .rollback(cutoff)
                .await?;
            println!("removed {} snapshots newer than {}", removed, cutoff);
            Ok(())
        }
        Command::TestDiff { job } => {
            let (ordinal, spec) = jobs::select_job(&job_file, &job)?;
            let task = spec.to_task(ordinal)?;
            let detector = ChangeDetector::new(store.as_ref());
            match detector.diff_stored(&task.job).await? {
                Some(diff) => print!("{}", diff),
                None => println!("job '{}' has fewer than two stored versions", task.job.name),
            }
            Ok(())
        }
        Command::Migrate => {
            let migrated = store.migrate_legacy().await?;
            println!("migrated {} jobs from the legacy layout", migrated);
            Ok(())
        }
    };

    store.close().await?;
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!("invalid log level '{}'", other);
            return CliExitCode::ConfigError.into();
        }
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {}", e);
        return CliExitCode::ConfigError.into();
    }

    let job_file = match jobs::load_job_file(&cli.jobs) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("job file error: {:#}", e);
            return CliExitCode::ConfigError.into();
        }
    };
    info!(jobs = job_file.jobs.len(), "job file loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return CliExitCode::RuntimeError.into();
        }
    };

    match rt.block_on(execute(cli, job_file)) {
        Ok(()) => CliExitCode::Success.into(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            CliExitCode::RuntimeError.into()
        }
    }
}
