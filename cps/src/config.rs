//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::readiness::ReadinessMode;
use crate::report::OutputFormat;

/// Main cps configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ranks in a run, coordinator included
    pub procs: usize,

    /// How the coordinator waits for idle workers
    pub readiness: ReadinessConfig,

    /// Worker command execution
    pub worker: WorkerConfig,

    /// Report output
    pub report: ReportConfig,

    /// Transport tuning
    pub transport: TransportConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Log to this file instead of stderr
    #[serde(rename = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            procs: 4,
            readiness: ReadinessConfig::default(),
            worker: WorkerConfig::default(),
            report: ReportConfig::default(),
            transport: TransportConfig::default(),
            log_level: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load `config_path`, or the first readable file from [`Config::search_paths`]
    ///
    /// An explicit path must load. Search-path files that fail to parse are
    /// skipped with a warning; with none found the built-in defaults apply.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %candidate.display(), error = %e, "Skipping unusable config"),
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Files tried when no `--config` is given: `./.cps.yml`, then the user config dir
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".cps.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("cps").join("cps.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!(path = %path.as_ref().display(), procs = config.procs, "Loaded config");
        Ok(config)
    }
}

/// Readiness strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// blocking or polling
    pub strategy: ReadinessMode,

    /// Sleep between full probe sweeps (polling only)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            strategy: ReadinessMode::Blocking,
            poll_interval_ms: 10,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Worker command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Shell used as `<shell> -c <command>`
    pub shell: String,

    /// Kill commands running longer than this; unset means no limit
    #[serde(rename = "command-timeout-secs")]
    pub command_timeout_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            command_timeout_secs: None,
        }
    }
}

impl WorkerConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Report output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cps.log"),
            format: OutputFormat::Text,
        }
    }
}

/// Transport tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Inbox capacity per rank
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// How long the coordinator waits for all workers to connect
    #[serde(rename = "accept-timeout-secs")]
    pub accept_timeout_secs: u64,

    /// How long a worker keeps trying to reach the coordinator
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 64,
            accept_timeout_secs: 60,
            connect_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_secs(self.accept_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.procs, 4);
        assert_eq!(config.readiness.strategy, ReadinessMode::Blocking);
        assert_eq!(config.readiness.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.worker.shell, "sh");
        assert!(config.worker.command_timeout().is_none());
        assert_eq!(config.report.path, PathBuf::from("cps.log"));
        assert_eq!(config.transport.channel_buffer, 64);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
procs: 8
readiness:
  strategy: polling
  poll-interval-ms: 25
worker:
  shell: bash
  command-timeout-secs: 600
report:
  path: out/report.json
  format: json
transport:
  channel-buffer: 16
  accept-timeout-secs: 5
log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.procs, 8);
        assert_eq!(config.readiness.strategy, ReadinessMode::Polling);
        assert_eq!(config.readiness.poll_interval_ms, 25);
        assert_eq!(config.worker.shell, "bash");
        assert_eq!(config.worker.command_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.report.format, OutputFormat::Json);
        assert_eq!(config.transport.accept_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
readiness:
  strategy: polling
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.readiness.strategy, ReadinessMode::Polling);
        assert_eq!(config.readiness.poll_interval_ms, 10);
        assert_eq!(config.procs, 4);
        assert_eq!(config.transport.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cps.yml");
        std::fs::write(&path, "procs: 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.procs, 3);
    }

    #[test]
    fn test_search_paths_start_with_project_file() {
        let paths = Config::search_paths();

        assert_eq!(paths[0], PathBuf::from(".cps.yml"));
        assert!(paths.iter().skip(1).all(|p| p.ends_with("cps/cps.yml")));
    }

    #[test]
    fn test_load_explicit_path_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cps.yml");
        std::fs::write(&path, "procs: [not, a, number]\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");

        assert!(Config::load(Some(&path)).is_err());
    }
}
