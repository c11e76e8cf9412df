//! Run report
//!
//! Formats per-job elapsed times and the aggregate parallel efficiency.
//! Parallel efficiency is the time spent executing jobs divided by the time
//! the workers had available: `total / (elapsed * workers)`.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::transport::Rank;

/// One dispatch decision: job `job` went to worker `rank`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    pub job: usize,
    pub rank: Rank,
}

/// Everything the coordinator observed during a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Ranks in the run, coordinator included
    pub procs: usize,
    /// Job commands in index order
    pub commands: Vec<String>,
    /// Elapsed time per job index; `None` if completion was never observed
    pub timings: Vec<Option<Duration>>,
    /// Dispatches in the order they were sent
    pub dispatches: Vec<Dispatch>,
    /// Wall-clock time from start of dispatch to the last shutdown
    pub elapsed: Duration,
    /// Shutdown assignments sent during the drain phase
    pub shutdowns_sent: usize,
}

impl RunReport {
    pub fn workers(&self) -> usize {
        self.procs.saturating_sub(1)
    }

    pub fn stats(&self) -> RunStats {
        RunStats::compute(self)
    }
}

/// Aggregates derived from a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub jobs: usize,
    pub procs: usize,
    pub total_task_secs: f64,
    pub elapsed_secs: f64,
    pub efficiency: f64,
    /// Jobs whose completion was never observed
    pub unrecorded: usize,
}

impl RunStats {
    pub fn compute(report: &RunReport) -> Self {
        let total = report.timings.iter().flatten().sum::<Duration>();
        let total_task_secs = secs(total);
        let elapsed_secs = secs(report.elapsed);
        let capacity = elapsed_secs * report.workers() as f64;

        let efficiency = if total_task_secs > 0.0 && capacity > 0.0 {
            total_task_secs / capacity
        } else {
            0.0
        };

        Self {
            jobs: report.commands.len(),
            procs: report.procs,
            total_task_secs,
            elapsed_secs,
            efficiency,
            unrecorded: report.timings.iter().filter(|t| t.is_none()).count(),
        }
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Seconds with millisecond resolution
fn secs(d: Duration) -> f64 {
    d.as_millis() as f64 / 1000.0
}

/// Human-readable report
pub fn render_text(report: &RunReport) -> String {
    let stats = report.stats();
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "Number of tasks : {}", stats.jobs);
    let _ = writeln!(out, "Number of processes : {}", stats.procs);
    let _ = writeln!(out, "Total execution time: {:.3} [s]", stats.total_task_secs);
    let _ = writeln!(out, "Elapsed time: {:.3} [s]", stats.elapsed_secs);
    let _ = writeln!(out, "Parallel Efficiency : {:.4}", stats.efficiency);
    let _ = writeln!(out);
    let _ = writeln!(out, "Task list:");
    let _ = writeln!(out, "Command : Elapsed time");
    for (command, timing) in report.commands.iter().zip(&report.timings) {
        match timing {
            Some(d) => {
                let _ = writeln!(out, "{} : {:.3} [s]", command, secs(*d));
            }
            None => {
                let _ = writeln!(out, "{} : - [s]", command);
            }
        }
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: String,
    started_at: String,
    #[serde(flatten)]
    stats: RunStats,
    shutdowns_sent: usize,
    tasks: Vec<JsonTask<'a>>,
}

#[derive(Serialize)]
struct JsonTask<'a> {
    index: usize,
    command: &'a str,
    rank: Option<Rank>,
    elapsed_secs: Option<f64>,
}

/// Worker that ran job `index`; dispatches are recorded in job index order
fn dispatched_to(report: &RunReport, index: usize) -> Option<Rank> {
    report.dispatches.get(index).filter(|d| d.job == index).map(|d| d.rank)
}

/// Machine-readable report
pub fn render_json(report: &RunReport) -> Result<String> {
    let tasks = report
        .commands
        .iter()
        .zip(&report.timings)
        .enumerate()
        .map(|(index, (command, timing))| JsonTask {
            index,
            command,
            rank: dispatched_to(report, index),
            elapsed_secs: timing.map(secs),
        })
        .collect();

    let json = JsonReport {
        run_id: report.run_id.to_string(),
        started_at: report.started_at.to_rfc3339(),
        stats: report.stats(),
        shutdowns_sent: report.shutdowns_sent,
        tasks,
    };
    serde_json::to_string_pretty(&json).context("Failed to serialize report")
}

pub fn render(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => render_json(report),
    }
}

/// Write the report to `path`, creating parent directories
pub fn write_report(report: &RunReport, path: &Path, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), ?format, "write_report: called");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create report directory")?;
    }
    let content = render(report, format)?;
    std::fs::write(path, content).context(format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
