//! Command execution capability for workers
//!
//! Workers hand each job to a [`CommandRunner`]. The default [`ShellRunner`]
//! runs it through the host shell with inherited stdio; tests substitute
//! scripted runners.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// How a command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with a status code
    Exited(i32),
    /// Killed by a signal
    Signalled,
    /// Exceeded the runner's timeout and was killed
    TimedOut(Duration),
    /// Could not be started
    SpawnFailed(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Exited(0))
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Exited(code) => write!(f, "exit code {}", code),
            CommandOutcome::Signalled => write!(f, "killed by signal"),
            CommandOutcome::TimedOut(after) => write!(f, "timed out after {:?}", after),
            CommandOutcome::SpawnFailed(e) => write!(f, "failed to start: {}", e),
        }
    }
}

/// Runs one job's command to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> CommandOutcome;
}

/// Runs commands with `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    timeout: Option<Duration>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            timeout: None,
        }
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> CommandOutcome {
        debug!(shell = %self.shell, %command, "ShellRunner::run: called");
        let mut child = match Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return CommandOutcome::SpawnFailed(e.to_string()),
        };

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            debug!(error = %e, "ShellRunner::run: kill after timeout failed");
                        }
                        return CommandOutcome::TimedOut(limit);
                    }
                }
            }
            None => child.wait().await,
        };

        match status {
            Ok(status) => match status.code() {
                Some(code) => CommandOutcome::Exited(code),
                None => CommandOutcome::Signalled,
            },
            Err(e) => CommandOutcome::SpawnFailed(e.to_string()),
        }
    }
}
