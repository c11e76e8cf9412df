//! Coordinator scheduling loop
//!
//! Hands jobs out in index order to whichever worker signals readiness first.
//! A worker's ready signal also marks completion of the job it held, so the
//! coordinator times each job from assignment to the holder's next ready
//! signal. Once every job is dispatched, each worker's next ready signal is
//! answered with a shutdown assignment.
//!
//! All state lives in the [`Coordinator`] and is touched only from
//! [`Coordinator::run`]; there is no internal concurrency.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RunError;
use crate::jobs::JobList;
use crate::readiness::ReadinessStrategy;
use crate::report::{Dispatch, RunReport};
use crate::transport::{Assignment, Message, Rank, Transport, TransportError};

/// A job held by a worker
#[derive(Debug, Clone, Copy)]
struct InFlight {
    job: usize,
    assigned_at: Instant,
}

/// Per-worker assignment state
#[derive(Debug, Default)]
pub struct WorkerSlot {
    current: Option<InFlight>,
}

impl WorkerSlot {
    /// Index of the job this worker holds, if any
    pub fn current_job(&self) -> Option<usize> {
        self.current.map(|f| f.job)
    }
}

/// Elapsed time per job index, each recorded at most once
#[derive(Debug, Clone, Default)]
pub struct TimingTable {
    entries: Vec<Option<Duration>>,
}

impl TimingTable {
    pub fn new(jobs: usize) -> Self {
        Self {
            entries: vec![None; jobs],
        }
    }

    /// Record a job's elapsed time; returns false if it was already recorded
    pub fn record(&mut self, job: usize, elapsed: Duration) -> bool {
        match self.entries.get_mut(job) {
            Some(entry @ None) => {
                *entry = Some(elapsed);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, job: usize) -> Option<Duration> {
        self.entries.get(job).copied().flatten()
    }

    pub fn recorded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn into_vec(self) -> Vec<Option<Duration>> {
        self.entries
    }
}

/// Dispatches a job list across the workers of one run
pub struct Coordinator {
    jobs: JobList,
    strategy: Box<dyn ReadinessStrategy>,
    /// Indexed by rank; slot 0 (the coordinator) stays empty
    slots: Vec<WorkerSlot>,
    timings: TimingTable,
    /// Next undispatched job index
    cursor: usize,
    dispatches: Vec<Dispatch>,
    shutdowns_sent: usize,
}

impl Coordinator {
    pub fn new(jobs: JobList, strategy: Box<dyn ReadinessStrategy>) -> Self {
        let timings = TimingTable::new(jobs.len());
        Self {
            jobs,
            strategy,
            slots: Vec::new(),
            timings,
            cursor: 0,
            dispatches: Vec::new(),
            shutdowns_sent: 0,
        }
    }

    /// Run the dispatch and drain phases and report what happened
    pub async fn run(mut self, transport: &mut dyn Transport) -> Result<RunReport, RunError> {
        let procs = transport.size();
        let workers = procs.saturating_sub(1);
        if workers == 0 && !self.jobs.is_empty() {
            return Err(RunError::NoWorkers { jobs: self.jobs.len() });
        }

        self.slots = (0..procs).map(|_| WorkerSlot::default()).collect();
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let t0 = Instant::now();
        info!(%run_id, jobs = self.jobs.len(), workers, "Dispatch started");

        while self.cursor < self.jobs.len() {
            let rank = self.strategy.next_ready(transport).await?;
            self.complete(rank, t0)?;
            self.assign(rank, transport, t0).await?;
        }

        let mut pending = workers;
        while pending > 0 {
            let rank = self.strategy.next_ready(transport).await?;
            self.complete(rank, t0)?;
            transport.send(rank, Message::Assign(Assignment::Shutdown)).await?;
            self.shutdowns_sent += 1;
            pending -= 1;
            debug!(rank, pending, "Worker released");
        }

        let elapsed = t0.elapsed();
        info!(
            %run_id,
            jobs = self.jobs.len(),
            recorded = self.timings.recorded(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            procs,
            commands: self.jobs.commands(),
            timings: self.timings.into_vec(),
            dispatches: self.dispatches,
            elapsed,
            shutdowns_sent: self.shutdowns_sent,
        })
    }

    /// Close out the job `rank` was holding, if any
    fn complete(&mut self, rank: Rank, t0: Instant) -> Result<(), TransportError> {
        let slot = self.slot_mut(rank)?;
        if let Some(done) = slot.current.take() {
            let elapsed = done.assigned_at.elapsed();
            if !self.timings.record(done.job, elapsed) {
                warn!(job = done.job, rank, "Job completed more than once, keeping first time");
            }
            debug!(
                job = done.job,
                rank,
                elapsed_ms = elapsed.as_millis() as u64,
                at_ms = t0.elapsed().as_millis() as u64,
                "Job finished"
            );
        }
        Ok(())
    }

    /// Hand the next job to `rank`
    async fn assign(&mut self, rank: Rank, transport: &mut dyn Transport, t0: Instant) -> Result<(), RunError> {
        let index = self.cursor;
        let Some(job) = self.jobs.get(index) else {
            return Ok(());
        };
        let command = job.command.clone();

        let slot = self.slot_mut(rank)?;
        debug_assert!(slot.current.is_none(), "worker {} already holds a job", rank);
        slot.current = Some(InFlight {
            job: index,
            assigned_at: Instant::now(),
        });

        debug!(job = index, rank, at_ms = t0.elapsed().as_millis() as u64, "Job assigned");
        transport
            .send(rank, Message::Assign(Assignment::Job { index, command }))
            .await?;

        self.dispatches.push(Dispatch { job: index, rank });
        self.cursor += 1;
        Ok(())
    }

    fn slot_mut(&mut self, rank: Rank) -> Result<&mut WorkerSlot, TransportError> {
        match self.slots.get_mut(rank) {
            Some(slot) if rank != 0 => Ok(slot),
            _ => Err(TransportError::UnknownPeer { from: 0, rank }),
        }
    }
}
