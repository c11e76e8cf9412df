//! cps - dynamic load-balancing dispatcher for shell command lists
//!
//! One coordinator rank hands commands from a job list to a pool of worker
//! ranks. Whichever worker reports idle first gets the next command, so long
//! and short jobs even out across workers without any upfront partitioning.
//! The coordinator times every job and writes a report with the per-job
//! elapsed times and the run's parallel efficiency.
//!
//! # Modules
//!
//! - [`jobs`] - Job list loading
//! - [`transport`] - Rank-addressed messaging (in-process and Unix socket)
//! - [`startup`] - All-ranks startup agreement
//! - [`readiness`] - Blocking and polling readiness detection
//! - [`coordinator`] - Dispatch and drain loops
//! - [`worker`] - Worker executor loop
//! - [`runner`] - Shell command execution
//! - [`report`] - Report rendering and efficiency
//! - [`cluster`] - Per-rank entry points and in-process runs
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod jobs;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod startup;
pub mod transport;
pub mod worker;

pub use cluster::{LocalRun, run_coordinator, run_local, run_worker};
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::RunError;
pub use jobs::{Job, JobList, JobListError};
pub use readiness::{BlockingReadiness, PollingReadiness, ReadinessMode, ReadinessStrategy};
pub use report::{OutputFormat, RunReport, RunStats};
pub use runner::{CommandOutcome, CommandRunner, ShellRunner};
pub use transport::{COORDINATOR, LocalCluster, Rank, SocketTransport, Transport};
pub use worker::{Worker, WorkerSummary};
