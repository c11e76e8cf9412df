//! Inbox with an unexpected-message queue
//!
//! All messages for a rank arrive on one channel. Receiving from a specific
//! peer parks messages from other peers in `pending` so they are delivered
//! later, in arrival order. Probing drains whatever has already arrived.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use super::{Envelope, Rank, Source, TransportError};

pub(crate) struct Mailbox {
    inbox: mpsc::Receiver<Envelope>,
    pending: VecDeque<Envelope>,
    disconnected: bool,
}

impl Mailbox {
    pub(crate) fn new(inbox: mpsc::Receiver<Envelope>) -> Self {
        Self {
            inbox,
            pending: VecDeque::new(),
            disconnected: false,
        }
    }

    pub(crate) async fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        if let Some(pos) = self.pending.iter().position(|e| from.matches(e.from))
            && let Some(envelope) = self.pending.remove(pos)
        {
            trace!(from = envelope.from, "Mailbox::recv: delivered from pending");
            return Ok(envelope);
        }

        loop {
            let Some(envelope) = self.inbox.recv().await else {
                self.disconnected = true;
                return Err(TransportError::Closed(from));
            };
            if from.matches(envelope.from) {
                return Ok(envelope);
            }
            trace!(from = envelope.from, ?from, "Mailbox::recv: parking message");
            self.pending.push_back(envelope);
        }
    }

    pub(crate) fn probe(&mut self, from: Rank) -> Result<bool, TransportError> {
        while !self.disconnected {
            match self.inbox.try_recv() {
                Ok(envelope) => self.pending.push_back(envelope),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.disconnected = true,
            }
        }

        let found = self.pending.iter().any(|e| e.from == from);
        if !found && self.disconnected {
            return Err(TransportError::Closed(Source::Rank(from)));
        }
        Ok(found)
    }
}
