//! Readiness detection strategies
//!
//! The coordinator needs to learn which worker became idle next. Two ways:
//!
//! - [`BlockingReadiness`] suspends in a receive-from-any until some worker
//!   signals. No CPU is spent while waiting.
//! - [`PollingReadiness`] sweeps every worker with a non-blocking probe and
//!   sleeps for a fixed interval between full sweeps. The coordinator never
//!   blocks indefinitely, at the cost of up to one interval of latency.
//!
//! Both consume exactly one `Ready` message per call and return its sender.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::transport::{Message, Rank, Source, Transport, TransportError};

/// How the coordinator waits for the next idle worker
#[async_trait]
pub trait ReadinessStrategy: Send {
    /// Wait for a ready signal, consume it and return the worker's rank
    async fn next_ready(&mut self, transport: &mut dyn Transport) -> Result<Rank, TransportError>;
}

/// Block on a receive from any worker
#[derive(Debug, Default)]
pub struct BlockingReadiness;

#[async_trait]
impl ReadinessStrategy for BlockingReadiness {
    async fn next_ready(&mut self, transport: &mut dyn Transport) -> Result<Rank, TransportError> {
        let envelope = transport.recv(Source::Any).await?;
        match envelope.message {
            Message::Ready => Ok(envelope.from),
            _ => Err(TransportError::unexpected(&envelope, "ready")),
        }
    }
}

/// Probe each worker in turn, sleeping between full sweeps
#[derive(Debug)]
pub struct PollingReadiness {
    interval: Duration,
    /// Next worker to probe; sweeps continue where the last hit left off
    cursor: Rank,
}

impl PollingReadiness {
    pub fn new(interval: Duration) -> Self {
        Self { interval, cursor: 1 }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl ReadinessStrategy for PollingReadiness {
    async fn next_ready(&mut self, transport: &mut dyn Transport) -> Result<Rank, TransportError> {
        let size = transport.size();
        if size < 2 {
            return Err(TransportError::Closed(Source::Any));
        }

        loop {
            while self.cursor < size {
                let rank = self.cursor;
                self.cursor += 1;

                if transport.probe(rank)? {
                    let envelope = transport.recv(Source::Rank(rank)).await?;
                    return match envelope.message {
                        Message::Ready => Ok(rank),
                        _ => Err(TransportError::unexpected(&envelope, "ready")),
                    };
                }
            }

            trace!(interval = ?self.interval, "PollingReadiness: sweep complete, sleeping");
            self.cursor = 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Which readiness strategy to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessMode {
    #[default]
    Blocking,
    Polling,
}

impl ReadinessMode {
    /// Build the strategy; `poll_interval` only applies to polling
    pub fn strategy(self, poll_interval: Duration) -> Box<dyn ReadinessStrategy> {
        match self {
            ReadinessMode::Blocking => Box::new(BlockingReadiness),
            ReadinessMode::Polling => Box::new(PollingReadiness::new(poll_interval)),
        }
    }
}

impl fmt::Display for ReadinessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessMode::Blocking => write!(f, "blocking"),
            ReadinessMode::Polling => write!(f, "polling"),
        }
    }
}

impl FromStr for ReadinessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" => Ok(ReadinessMode::Blocking),
            "polling" => Ok(ReadinessMode::Polling),
            other => Err(format!("unknown readiness strategy '{}' (expected blocking or polling)", other)),
        }
    }
}
