//! Peer entry points
//!
//! Every rank first takes part in the startup agreement and only then enters
//! its role: the coordinator's scheduling loop or a worker's executor loop.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::error::RunError;
use crate::jobs::{JobList, JobListError};
use crate::readiness::ReadinessStrategy;
use crate::report::RunReport;
use crate::runner::CommandRunner;
use crate::startup;
use crate::transport::{LocalCluster, Transport};
use crate::worker::{Worker, WorkerSummary};

/// Run rank 0: agree on startup, then dispatch `jobs`
///
/// A job list that failed to load is voted down in the agreement so that no
/// worker enters its loop, and is then returned as the error.
pub async fn run_coordinator(
    transport: &mut dyn Transport,
    jobs: Result<JobList, JobListError>,
    strategy: Box<dyn ReadinessStrategy>,
) -> Result<RunReport, RunError> {
    let workers = transport.size().saturating_sub(1);
    let local: Result<JobList, RunError> = match jobs {
        Ok(list) if workers == 0 && !list.is_empty() => Err(RunError::NoWorkers { jobs: list.len() }),
        Ok(list) => Ok(list),
        Err(e) => Err(e.into()),
    };

    let proceed = startup::agree(transport, local.is_ok()).await?;
    let jobs = local?;
    if !proceed {
        return Err(RunError::StartupAborted("a worker was not ready".to_string()));
    }

    Coordinator::new(jobs, strategy).run(transport).await
}

/// Run a worker rank: agree on startup, then execute assignments
pub async fn run_worker(
    transport: &mut dyn Transport,
    runner: Arc<dyn CommandRunner>,
) -> Result<WorkerSummary, RunError> {
    if !startup::agree(transport, true).await? {
        return Err(RunError::StartupAborted(format!(
            "coordinator could not start (rank {})",
            transport.rank()
        )));
    }

    let mut worker = Worker::new(runner);
    Ok(worker.run_loop(transport).await?)
}

/// Outcome of an in-process run
#[derive(Debug)]
pub struct LocalRun {
    pub report: RunReport,
    pub workers: Vec<WorkerSummary>,
}

/// Run every rank of a `procs`-rank run as tasks of this process
pub async fn run_local(
    procs: usize,
    channel_buffer: usize,
    jobs: Result<JobList, JobListError>,
    strategy: Box<dyn ReadinessStrategy>,
    runner: Arc<dyn CommandRunner>,
) -> Result<LocalRun, RunError> {
    debug!(procs, channel_buffer, "run_local: called");
    let mut endpoints = LocalCluster::new(procs.max(1), channel_buffer);
    let mut coordinator = endpoints.remove(0);

    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|mut transport| {
            let runner = runner.clone();
            tokio::spawn(async move { run_worker(&mut transport, runner).await })
        })
        .collect();

    let report = match run_coordinator(&mut coordinator, jobs, strategy).await {
        Ok(report) => report,
        Err(e) => {
            if e.is_startup() {
                // Workers were told not to proceed and exit on their own
                for result in join_all(handles).await {
                    if let Ok(Err(worker_err)) = result {
                        debug!(error = %worker_err, "Worker stopped at startup");
                    }
                }
            } else {
                error!(error = %e, "Coordinator failed, cancelling workers");
                for handle in &handles {
                    handle.abort();
                }
            }
            return Err(e);
        }
    };

    let mut workers = Vec::with_capacity(handles.len());
    for result in join_all(handles).await {
        let summary = result.map_err(|e| RunError::WorkerTask(e.to_string()))??;
        workers.push(summary);
    }

    info!(
        workers = workers.len(),
        failures = workers.iter().map(|w| w.failures).sum::<usize>(),
        "All workers finished"
    );
    Ok(LocalRun { report, workers })
}
