//! CLI definitions

use clap::Parser;
use std::path::PathBuf;

use crate::readiness::ReadinessMode;
use crate::report::OutputFormat;

/// cps - dynamic load-balancing dispatcher for shell command lists
#[derive(Debug, Parser)]
#[command(
    name = "cps",
    about = "Run a list of shell commands across a pool of workers",
    version,
    after_help = "Without --listen or --connect all ranks run inside this process.\n\
                  With --listen this process is the coordinator and waits for PROCS-1 \
                  `cps --connect SOCKET` workers."
)]
pub struct Cli {
    /// Job list: one shell command per line, `#` starts a comment line
    #[arg(value_name = "JOBLIST")]
    pub joblist: Option<PathBuf>,

    /// Ranks in the run, coordinator included
    #[arg(short = 'n', long)]
    pub procs: Option<usize>,

    /// How the coordinator waits for idle workers (blocking, polling)
    #[arg(short, long)]
    pub strategy: Option<ReadinessMode>,

    /// Sleep between polling sweeps in milliseconds
    #[arg(long = "poll-interval-ms", value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Report file
    #[arg(short, long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Report format (text, json)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Act as coordinator, accepting workers on this Unix socket
    #[arg(long, value_name = "SOCKET", conflicts_with = "connect")]
    pub listen: Option<PathBuf>,

    /// Act as a worker of the coordinator at this Unix socket
    #[arg(long, value_name = "SOCKET")]
    pub connect: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,
}

/// How this process takes part in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every rank as a task of this process
    Local,
    /// Coordinator over a Unix socket
    Listen(PathBuf),
    /// Worker over a Unix socket
    Connect(PathBuf),
}

impl Cli {
    pub fn mode(&self) -> Mode {
        match (&self.listen, &self.connect) {
            (Some(path), _) => Mode::Listen(path.clone()),
            (None, Some(path)) => Mode::Connect(path.clone()),
            (None, None) => Mode::Local,
        }
    }
}
