//! Worker executor loop
//!
//! A worker repeatedly signals readiness, waits for an assignment and runs it.
//! The ready signal sent after a job doubles as that job's completion notice;
//! the command's exit status is logged here and never reported back.
//!
//! ```text
//! Idle -> AwaitingAssignment -> Executing -> Idle -> ...
//!                            \-> Terminated
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::runner::CommandRunner;
use crate::transport::{Assignment, COORDINATOR, Message, Rank, Source, Transport, TransportError};

/// Where a worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    AwaitingAssignment,
    Executing,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::AwaitingAssignment => write!(f, "awaiting-assignment"),
            WorkerState::Executing => write!(f, "executing"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// What a worker did during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: Rank,
    /// Job indices in the order this worker ran them
    pub jobs: Vec<usize>,
    /// Jobs whose command did not exit successfully
    pub failures: usize,
}

impl WorkerSummary {
    pub fn jobs_run(&self) -> usize {
        self.jobs.len()
    }
}

/// Executes assignments from the coordinator until told to stop
pub struct Worker {
    runner: Arc<dyn CommandRunner>,
    state: WorkerState,
}

impl Worker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, rank: Rank, next: WorkerState) {
        debug!(rank, from = %self.state, to = %next, "Worker state change");
        self.state = next;
    }

    /// Run until a shutdown assignment arrives
    pub async fn run_loop(&mut self, transport: &mut dyn Transport) -> Result<WorkerSummary, TransportError> {
        let rank = transport.rank();
        let mut summary = WorkerSummary {
            rank,
            ..Default::default()
        };

        loop {
            transport.send(COORDINATOR, Message::Ready).await?;
            self.transition(rank, WorkerState::AwaitingAssignment);

            let envelope = transport.recv(Source::Rank(COORDINATOR)).await?;
            match envelope.message {
                Message::Assign(Assignment::Shutdown) => {
                    self.transition(rank, WorkerState::Terminated);
                    info!(rank, jobs = summary.jobs_run(), failures = summary.failures, "Worker finished");
                    return Ok(summary);
                }
                Message::Assign(Assignment::Job { index, command }) => {
                    self.transition(rank, WorkerState::Executing);
                    debug!(rank, job = index, %command, "Running job");

                    let outcome = self.runner.run(&command).await;
                    if !outcome.is_success() {
                        warn!(rank, job = index, %command, %outcome, "Job did not succeed");
                        summary.failures += 1;
                    }
                    summary.jobs.push(index);
                    self.transition(rank, WorkerState::Idle);
                }
                _ => return Err(TransportError::unexpected(&envelope, "assign")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutcome;
    use crate::transport::LocalCluster;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for Recorder {
        async fn run(&self, command: &str) -> CommandOutcome {
            self.commands.lock().unwrap().push(command.to_string());
            if command == "fail" {
                CommandOutcome::Exited(1)
            } else {
                CommandOutcome::Exited(0)
            }
        }
    }

    fn job(index: usize, command: &str) -> Message {
        Message::Assign(Assignment::Job {
            index,
            command: command.to_string(),
        })
    }

    #[tokio::test]
    async fn test_worker_runs_until_shutdown() {
        let mut cluster = LocalCluster::new(2, 8);
        let mut wt = cluster.pop().unwrap();
        let mut coord = cluster.pop().unwrap();

        let recorder = Arc::new(Recorder::default());
        let runner: Arc<dyn CommandRunner> = recorder.clone();
        let handle = tokio::spawn(async move {
            let mut worker = Worker::new(runner);
            let summary = worker.run_loop(&mut wt).await.unwrap();
            (summary, worker.state())
        });

        for (i, cmd) in ["echo a", "fail"].iter().enumerate() {
            let ready = coord.recv(Source::Rank(1)).await.unwrap();
            assert_eq!(ready.message, Message::Ready);
            coord.send(1, job(i, cmd)).await.unwrap();
        }
        coord.recv(Source::Rank(1)).await.unwrap();
        coord.send(1, Message::Assign(Assignment::Shutdown)).await.unwrap();

        let (summary, state) = handle.await.unwrap();
        assert_eq!(summary.rank, 1);
        assert_eq!(summary.jobs, vec![0, 1]);
        assert_eq!(summary.failures, 1);
        assert_eq!(state, WorkerState::Terminated);
        assert_eq!(*recorder.commands.lock().unwrap(), vec!["echo a", "fail"]);
    }

    #[tokio::test]
    async fn test_worker_immediate_shutdown() {
        let mut cluster = LocalCluster::new(2, 8);
        let mut wt = cluster.pop().unwrap();
        let mut coord = cluster.pop().unwrap();

        let handle = tokio::spawn(async move {
            let mut worker = Worker::new(Arc::new(Recorder::default()));
            worker.run_loop(&mut wt).await.unwrap()
        });

        coord.recv(Source::Any).await.unwrap();
        coord.send(1, Message::Assign(Assignment::Shutdown)).await.unwrap();

        let summary = handle.await.unwrap();
        assert_eq!(summary.jobs_run(), 0);
    }

    #[tokio::test]
    async fn test_worker_rejects_unexpected_message() {
        let mut cluster = LocalCluster::new(2, 8);
        let mut wt = cluster.pop().unwrap();
        let mut coord = cluster.pop().unwrap();

        let handle = tokio::spawn(async move {
            let mut worker = Worker::new(Arc::new(Recorder::default()));
            worker.run_loop(&mut wt).await
        });

        coord.recv(Source::Any).await.unwrap();
        coord.send(1, Message::Verdict { proceed: true }).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransportError::Unexpected { from: 0, .. })));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkerState::AwaitingAssignment.to_string(), "awaiting-assignment");
    }
}
