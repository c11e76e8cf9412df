use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use cps::cli::{Cli, Mode};
use cps::config::Config;
use cps::jobs::JobList;
use cps::report::{self, RunReport};
use cps::runner::{CommandRunner, ShellRunner};
use cps::transport::SocketTransport;
use cps::worker::WorkerSummary;
use cps::{run_coordinator, run_local, run_worker};

fn setup_logging(level: Option<&str>, log_file: Option<&std::path::Path>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let level = match level.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Fold command-line overrides into the loaded config
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(procs) = cli.procs {
        config.procs = procs;
    }
    if let Some(strategy) = cli.strategy {
        config.readiness.strategy = strategy;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.readiness.poll_interval_ms = ms;
    }
    if let Some(path) = &cli.report {
        config.report.path = path.clone();
    }
    if let Some(format) = cli.format {
        config.report.format = format;
    }
}

fn shell_runner(config: &Config) -> Arc<dyn CommandRunner> {
    Arc::new(ShellRunner::new(config.worker.shell.clone()).with_timeout(config.worker.command_timeout()))
}

fn print_run_summary(config: &Config, report: &RunReport) {
    let stats = report.stats();
    println!(
        "{} {} jobs on {} workers in {:.3}s (efficiency {:.4})",
        "✓".green(),
        stats.jobs,
        report.workers(),
        stats.elapsed_secs,
        stats.efficiency
    );
    if stats.unrecorded > 0 {
        println!("{} {} jobs without a recorded time", "!".yellow(), stats.unrecorded);
    }
    println!("Report: {}", config.report.path.display().to_string().cyan());
}

fn print_worker_summary(summary: &WorkerSummary) {
    let mark = if summary.failures == 0 { "✓".green() } else { "!".yellow() };
    println!(
        "{} Worker {} ran {} jobs ({} failed)",
        mark,
        summary.rank,
        summary.jobs_run(),
        summary.failures
    );
}

async fn cmd_local(config: &Config, cli: &Cli) -> Result<()> {
    debug!(procs = config.procs, "cmd_local: called");
    let jobs = JobList::load(cli.joblist.as_deref());
    let strategy = config.readiness.strategy.strategy(config.readiness.poll_interval());

    let run = run_local(
        config.procs,
        config.transport.channel_buffer,
        jobs,
        strategy,
        shell_runner(config),
    )
    .await?;

    report::write_report(&run.report, &config.report.path, config.report.format)?;
    print_run_summary(config, &run.report);
    Ok(())
}

async fn cmd_listen(config: &Config, cli: &Cli, socket: &std::path::Path) -> Result<()> {
    debug!(socket = %socket.display(), procs = config.procs, "cmd_listen: called");
    let jobs = JobList::load(cli.joblist.as_deref());

    let mut transport = SocketTransport::listen(
        socket,
        config.procs.max(1),
        config.transport.accept_timeout(),
        config.transport.channel_buffer,
    )
    .await
    .context(format!("Failed to accept workers on {}", socket.display()))?;

    let strategy = config.readiness.strategy.strategy(config.readiness.poll_interval());
    let run_report = run_coordinator(&mut transport, jobs, strategy).await?;

    report::write_report(&run_report, &config.report.path, config.report.format)?;
    print_run_summary(config, &run_report);
    Ok(())
}

async fn cmd_connect(config: &Config, socket: &std::path::Path) -> Result<()> {
    debug!(socket = %socket.display(), "cmd_connect: called");
    let mut transport = SocketTransport::connect(
        socket,
        config.transport.connect_timeout(),
        config.transport.channel_buffer,
    )
    .await
    .context(format!("Failed to join coordinator at {}", socket.display()))?;

    let summary = run_worker(&mut transport, shell_runner(config)).await?;
    print_worker_summary(&summary);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);

    // Log level priority: CLI --log-level > config file > INFO
    let level = cli.log_level.as_deref().or(config.log_level.as_deref());
    setup_logging(level, config.log_file.as_deref()).context("Failed to setup logging")?;

    let mode = cli.mode();
    debug!(?mode, "main: dispatching");
    match mode {
        Mode::Local => cmd_local(&config, &cli).await,
        Mode::Listen(socket) => cmd_listen(&config, &cli, &socket).await,
        Mode::Connect(socket) => cmd_connect(&config, &socket).await,
    }
}
