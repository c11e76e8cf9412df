//! Point-to-point message transport between ranks
//!
//! A run is a fixed set of ranks: rank 0 is the coordinator, ranks 1..size
//! are workers. A [`Transport`] is one rank's endpoint and offers the three
//! primitives the scheduling protocol needs:
//!
//! - **send** a message to a specific rank
//! - **recv** from a specific rank or from any rank (blocking)
//! - **probe** whether a message from a specific rank is waiting (non-blocking)
//!
//! Messages between any two ranks are delivered in the order they were sent.
//!
//! # Implementations
//!
//! - [`LocalCluster`]: every rank is a task in this process
//! - [`SocketTransport`]: every worker is a separate process on a Unix socket

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod local;
mod mailbox;
pub mod socket;

pub use local::{LocalCluster, LocalTransport};
pub use socket::SocketTransport;

/// Stable identifier of a participant in a run
pub type Rank = usize;

/// Rank of the coordinator
pub const COORDINATOR: Rank = 0;

/// Which peer a receive accepts messages from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    Rank(Rank),
}

impl Source {
    pub fn matches(&self, rank: Rank) -> bool {
        match self {
            Source::Any => true,
            Source::Rank(r) => *r == rank,
        }
    }
}

/// What the coordinator hands to a worker in reply to a ready signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Assignment {
    /// Run this command
    Job { index: usize, command: String },

    /// No more work; the worker terminates
    Shutdown,
}

/// Messages exchanged between ranks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Worker's vote in the startup agreement
    Startup { ready: bool },

    /// Coordinator's decision in the startup agreement
    Verdict { proceed: bool },

    /// Worker is idle and wants an assignment
    Ready,

    /// Coordinator's reply to a ready signal
    Assign(Assignment),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Startup { .. } => "startup",
            Message::Verdict { .. } => "verdict",
            Message::Ready => "ready",
            Message::Assign(Assignment::Job { .. }) => "assign-job",
            Message::Assign(Assignment::Shutdown) => "assign-shutdown",
        }
    }
}

/// A received message and the rank it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: Rank,
    pub message: Message,
}

/// Transport failures. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed while waiting for {0:?}")]
    Closed(Source),

    #[error("Rank {rank} is not reachable from rank {from}")]
    UnknownPeer { from: Rank, rank: Rank },

    #[error("Unexpected {got} message from rank {from}, expected {expected}")]
    Unexpected {
        from: Rank,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl TransportError {
    pub fn unexpected(envelope: &Envelope, expected: &'static str) -> Self {
        TransportError::Unexpected {
            from: envelope.from,
            expected,
            got: envelope.message.kind(),
        }
    }
}

/// One rank's endpoint into the run
#[async_trait]
pub trait Transport: Send {
    /// This endpoint's rank
    fn rank(&self) -> Rank;

    /// Number of ranks in the run, coordinator included
    fn size(&self) -> usize;

    /// Send a message to a rank, waiting until the transport accepts it
    async fn send(&mut self, to: Rank, message: Message) -> Result<(), TransportError>;

    /// Wait for the next message from `from`
    async fn recv(&mut self, from: Source) -> Result<Envelope, TransportError>;

    /// Check whether a message from `from` is waiting, without blocking
    fn probe(&mut self, from: Rank) -> Result<bool, TransportError>;

    /// Ranks of all workers in the run
    fn workers(&self) -> std::ops::Range<Rank> {
        1..self.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_matches() {
        assert!(Source::Any.matches(3));
        assert!(Source::Rank(3).matches(3));
        assert!(!Source::Rank(2).matches(3));
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::Assign(Assignment::Job {
            index: 7,
            command: "echo hi".to_string(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"assign","kind":"job","index":7,"command":"echo hi"}"#);

        let json = serde_json::to_string(&Message::Ready).unwrap();
        assert_eq!(json, r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_shutdown_deserialize() {
        let msg: Message = serde_json::from_str(r#"{"type":"assign","kind":"shutdown"}"#).unwrap();
        assert_eq!(msg, Message::Assign(Assignment::Shutdown));
    }

    #[test]
    fn test_unexpected_error_message() {
        let envelope = Envelope {
            from: 2,
            message: Message::Verdict { proceed: true },
        };
        let err = TransportError::unexpected(&envelope, "ready");
        assert_eq!(err.to_string(), "Unexpected verdict message from rank 2, expected ready");
    }
}
