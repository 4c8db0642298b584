//! Command execution
//!
//! `CommandRunner` abstracts "run a step, wait for it, report how it ended"
//! so sequences can be asserted without touching the OS.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::commands::CommandStep;

/// Why a step did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("exited with status {code}: {stderr}")]
    Exited { code: i32, stderr: String },

    #[error("terminated by a signal")]
    Signaled,

    #[error("did not finish within {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

/// Runs one command step to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, step: &CommandStep) -> Result<(), CommandError>;
}

/// Runs steps as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// `None` waits indefinitely for each step
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(cmd = %step))]
    async fn run(&self, step: &CommandStep) -> Result<(), CommandError> {
        debug!("running command");

        let child = Command::new(&step.program)
            .args(&step.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn {
                program: step.program.clone(),
                reason: e.to_string(),
            })?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    // dropping the future kills the child
                    warn!(timeout_ms = limit.as_millis() as u64, "command timed out");
                    return Err(CommandError::TimedOut(limit));
                }
            },
            None => wait.await,
        }
        .map_err(|e| CommandError::Spawn {
            program: step.program.clone(),
            reason: e.to_string(),
        })?;

        if output.status.success() {
            return Ok(());
        }

        match output.status.code() {
            Some(code) => Err(CommandError::Exited {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            None => Err(CommandError::Signaled),
        }
    }
}
