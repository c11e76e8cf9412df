//! Job list loading
//!
//! A job list is a text file with one shell command per line. Lines starting
//! with `#` are comments and blank lines are ignored; every other line becomes
//! a job, indexed densely from 0 in file order.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Errors from loading a job list
#[derive(Debug, Error)]
pub enum JobListError {
    #[error("Usage: cps <JOBLIST>")]
    MissingPath,

    #[error("Could not open {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single shell command and its position in the job list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub command: String,
}

/// Ordered, immutable list of jobs for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    /// Load a job list from a file
    pub fn load(path: Option<&Path>) -> Result<Self, JobListError> {
        let path = path.ok_or(JobListError::MissingPath)?;
        debug!(path = %path.display(), "JobList::load: called");

        let content = fs::read_to_string(path).map_err(|source| JobListError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let list = Self::parse(&content);
        info!(path = %path.display(), jobs = list.len(), "Loaded job list");
        Ok(list)
    }

    /// Parse job list text, skipping comment and blank lines
    pub fn parse(content: &str) -> Self {
        Self::from_commands(content.lines().filter(|line| is_job_line(line)))
    }

    /// Build a job list from commands, in order
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let jobs = commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| Job {
                index,
                command: command.into(),
            })
            .collect();
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Commands in job index order
    pub fn commands(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.command.clone()).collect()
    }
}

fn is_job_line(line: &str) -> bool {
    !line.starts_with('#') && !line.trim().is_empty()
}
