//! Run-level errors

use thiserror::Error;

use crate::jobs::JobListError;
use crate::transport::TransportError;

/// Errors that end a run on any peer
#[derive(Debug, Error)]
pub enum RunError {
    /// The coordinator could not load its job list
    #[error(transparent)]
    JobList(#[from] JobListError),

    /// Jobs exist but no worker rank is present
    #[error("No workers available for {jobs} jobs (at least 2 processes required)")]
    NoWorkers { jobs: usize },

    /// Some peer was not ready, so nobody proceeded
    #[error("Startup aborted: {0}")]
    StartupAborted(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    WorkerTask(String),
}

impl RunError {
    /// Whether this failure happened before any job was dispatched
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            RunError::JobList(_) | RunError::NoWorkers { .. } | RunError::StartupAborted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_startup() {
        assert!(RunError::JobList(JobListError::MissingPath).is_startup());
        assert!(RunError::NoWorkers { jobs: 3 }.is_startup());
        assert!(RunError::StartupAborted("peer".to_string()).is_startup());
        assert!(!RunError::WorkerTask("panic".to_string()).is_startup());
    }

    #[test]
    fn test_job_list_error_is_transparent() {
        let err = RunError::from(JobListError::MissingPath);
        assert_eq!(err.to_string(), "Usage: cps <JOBLIST>");
    }
}
