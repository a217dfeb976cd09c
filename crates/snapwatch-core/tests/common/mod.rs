//! Test doubles and common utilities for architecture contract tests
//!
//! Minimal collaborators that let the contract tests drive the runner and
//! detector without real network or process I/O.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use snapwatch_core::traits::ContentSource;
use snapwatch_core::{AcquireError, Job};

/// A source that replays a scripted sequence of outcomes, then repeats the
/// last one
pub struct ScriptedSource {
    location: String,
    script: Mutex<VecDeque<Result<String, AcquireError>>>,
    last: Mutex<Result<String, AcquireError>>,
    fetch_count: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(
        location: impl Into<String>,
        outcomes: Vec<Result<String, AcquireError>>,
    ) -> Arc<Self> {
        let script: VecDeque<_> = outcomes.into();
        let last = script
            .back()
            .cloned()
            .unwrap_or_else(|| Err(AcquireError::other("script exhausted")));
        Arc::new(Self {
            location: location.into(),
            script: Mutex::new(script),
            last: Mutex::new(last),
            fetch_count: AtomicUsize::new(0),
        })
    }

    /// A source that always succeeds with the same content
    pub fn constant(location: impl Into<String>, content: &str) -> Arc<Self> {
        Self::new(location, vec![Ok(content.to_string())])
    }

    /// A source that always fails the same way
    pub fn failing(location: impl Into<String>, err: AcquireError) -> Arc<Self> {
        Self::new(location, vec![Err(err)])
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<String, AcquireError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(outcome) => {
                *self.last.lock().unwrap() = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// A job named and located after its ordinal
pub fn numbered_job(ordinal: usize) -> Job {
    Job::new(
        format!("job-{}", ordinal),
        format!("https://example.org/{}", ordinal),
        ordinal,
    )
}
