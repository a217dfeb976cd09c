//! Job list loading
//!
//! Jobs are declared in a YAML file and materialized fresh on every
//! invocation. Sources and filters are closed sets resolved here, at load
//! time; an unknown type is a parse error, not a runtime lookup failure.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use snapwatch_core::traits::{ContentFilter, ContentSource};
use snapwatch_core::{DiffConfig, ErrorPolicy, Job, JobTask};

use crate::filters::{DropLines, KeepLines, SortLines, StripWhitespace};

/// Top-level structure of the job file
#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<JobSpec>,
}

/// One job declaration
#[derive(Debug, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Acquisition timeout in seconds; 0 or absent means unbounded
    #[serde(default)]
    pub timeout: u64,
    #[serde(default = "default_depth")]
    pub comparison_depth: usize,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    #[serde(default)]
    pub heavyweight: bool,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

fn default_depth() -> usize {
    1
}

fn default_max_tries() -> u32 {
    1
}

/// Acquisition declaration; one variant per source crate
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Fetch a URL over HTTP(S)
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Run a shell command and watch its standard output
    Exec { command: String },
}

impl SourceSpec {
    /// The location string identifying the job
    pub fn location(&self) -> &str {
        match self {
            Self::Http { url, .. } => url,
            Self::Exec { command } => command,
        }
    }
}

/// Filter declaration; one variant per built-in filter
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    StripWhitespace,
    SortLines,
    KeepLines { pattern: String },
    DropLines { pattern: String },
}

impl FilterSpec {
    fn build(&self) -> Arc<dyn ContentFilter> {
        match self {
            Self::StripWhitespace => Arc::new(StripWhitespace),
            Self::SortLines => Arc::new(SortLines),
            Self::KeepLines { pattern } => Arc::new(KeepLines::new(pattern.clone())),
            Self::DropLines { pattern } => Arc::new(DropLines::new(pattern.clone())),
        }
    }
}

/// Parse the job file at `path`
pub fn load_job_file(path: &Path) -> Result<JobFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read job file {}", path.display()))?;
    let file: JobFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("cannot parse job file {}", path.display()))?;
    if file.jobs.is_empty() {
        bail!("job file {} declares no jobs", path.display());
    }
    Ok(file)
}

/// Materialize the job list without binding sources (maintenance commands)
pub fn jobs_only(file: &JobFile) -> Vec<Job> {
    file.jobs
        .iter()
        .enumerate()
        .map(|(i, spec)| spec.to_job(i + 1))
        .collect()
}

impl JobSpec {
    fn to_job(&self, ordinal: usize) -> Job {
        Job::new(&self.name, self.source.location(), ordinal)
            .with_timeout_secs(self.timeout)
            .with_comparison_depth(self.comparison_depth)
            .with_max_tries(self.max_tries)
            .with_heavyweight(self.heavyweight)
            .with_diff(self.diff.clone())
            .with_error_policy(self.error_policy.clone())
    }

    fn build_source(&self) -> Result<Arc<dyn ContentSource>> {
        match &self.source {
            #[cfg(feature = "http")]
            SourceSpec::Http { url, headers } => {
                let source = snapwatch_source_http::HttpSource::with_headers(
                    url.clone(),
                    headers.clone(),
                )
                .map_err(|e| anyhow::anyhow!("job '{}': {}", self.name, e))?;
                Ok(Arc::new(source))
            }
            #[cfg(not(feature = "http"))]
            SourceSpec::Http { .. } => bail!(
                "job '{}' uses an http source but this build has no http support",
                self.name
            ),
            #[cfg(feature = "exec")]
            SourceSpec::Exec { command } => {
                Ok(Arc::new(snapwatch_source_exec::ExecSource::new(command.clone())))
            }
            #[cfg(not(feature = "exec"))]
            SourceSpec::Exec { .. } => bail!(
                "job '{}' uses an exec source but this build has no exec support",
                self.name
            ),
        }
    }

    /// Bind the job to its source and filter chain
    pub fn to_task(&self, ordinal: usize) -> Result<JobTask> {
        let job = self.to_job(ordinal);
        job.validate()?;
        let source = self.build_source()?;
        let filters = self.filters.iter().map(FilterSpec::build).collect();
        Ok(JobTask::new(job, source).with_filters(filters))
    }
}

/// Materialize every job with its collaborators, in file order
pub fn build_tasks(file: &JobFile) -> Result<Vec<JobTask>> {
    file.jobs
        .iter()
        .enumerate()
        .map(|(i, spec)| spec.to_task(i + 1))
        .collect()
}

/// Resolve a job selector: a 1-based index or a job name
pub fn select_job<'a>(file: &'a JobFile, selector: &str) -> Result<(usize, &'a JobSpec)> {
    if let Ok(index) = selector.parse::<usize>() {
        if index == 0 || index > file.jobs.len() {
            bail!(
                "job index {} out of range (1..={})",
                index,
                file.jobs.len()
            );
        }
        return Ok((index, &file.jobs[index - 1]));
    }

    file.jobs
        .iter()
        .enumerate()
        .find(|(_, spec)| spec.name == selector)
        .map(|(i, spec)| (i + 1, spec))
        .ok_or_else(|| anyhow::anyhow!("no job named '{}'", selector))
}
