//! All-or-nothing startup agreement
//!
//! Before any scheduling message flows, every rank votes whether it is ready.
//! Workers send their vote to the coordinator, which combines them with its
//! own (job list loaded, workers present) and broadcasts the verdict. Either
//! every rank enters its loop or none does.

use tracing::{debug, info, warn};

use crate::transport::{COORDINATOR, Message, Source, Transport, TransportError};

/// Vote `ready` and return whether the whole run proceeds
pub async fn agree(transport: &mut dyn Transport, ready: bool) -> Result<bool, TransportError> {
    if transport.rank() == COORDINATOR {
        coordinator_agree(transport, ready).await
    } else {
        worker_agree(transport, ready).await
    }
}

async fn coordinator_agree(transport: &mut dyn Transport, ready: bool) -> Result<bool, TransportError> {
    let mut proceed = ready;
    for rank in transport.workers() {
        let envelope = transport.recv(Source::Rank(rank)).await?;
        match envelope.message {
            Message::Startup { ready } => {
                if !ready {
                    warn!(rank, "Worker not ready");
                }
                proceed &= ready;
            }
            _ => return Err(TransportError::unexpected(&envelope, "startup")),
        }
    }

    for rank in transport.workers() {
        transport.send(rank, Message::Verdict { proceed }).await?;
    }

    info!(proceed, peers = transport.size(), "Startup agreement reached");
    Ok(proceed)
}

async fn worker_agree(transport: &mut dyn Transport, ready: bool) -> Result<bool, TransportError> {
    transport.send(COORDINATOR, Message::Startup { ready }).await?;

    let envelope = transport.recv(Source::Rank(COORDINATOR)).await?;
    match envelope.message {
        Message::Verdict { proceed } => {
            debug!(rank = transport.rank(), proceed, "Received startup verdict");
            Ok(proceed && ready)
        }
        _ => Err(TransportError::unexpected(&envelope, "verdict")),
    }
}
