// # Command Content Source
//
// This crate provides a command-execution content source for the snapwatch
// monitoring system.
//
// ## Purpose
//
// Runs a shell command and treats its standard output as the monitored
// content. A non-zero exit status is an acquisition failure carrying the
// exit code and captured standard error.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use snapwatch_core::traits::ContentSource;
use snapwatch_core::AcquireError;

/// Keep at most this much captured stderr in an error
const MAX_STDERR: usize = 4096;

/// Shell-command content source for one job
pub struct ExecSource {
    command: String,
}

impl ExecSource {
    /// Create a source running the given shell command line
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ContentSource for ExecSource {
    fn location(&self) -> &str {
        &self.command
    }

    async fn fetch(&self) -> Result<String, AcquireError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AcquireError::other(format!("cannot run command: {}", e)))?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if stderr.len() > MAX_STDERR {
                let mut cut = MAX_STDERR;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            return Err(AcquireError::Process {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim_end().to_string(),
            });
        }

        let content = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(command = %self.command, bytes = content.len(), "command produced content");
        Ok(content)
    }
}
