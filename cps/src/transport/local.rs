//! In-process transport
//!
//! Every rank gets a bounded inbox and a sender to every other rank's inbox.
//! Used to run the coordinator and all workers as tasks of one process, and
//! by the tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::mailbox::Mailbox;
use super::{Envelope, Message, Rank, Source, Transport, TransportError};

/// Factory for a fully connected set of local endpoints
pub struct LocalCluster;

impl LocalCluster {
    /// Create `size` connected endpoints; element `i` is rank `i`
    pub fn new(size: usize, channel_buffer: usize) -> Vec<LocalTransport> {
        debug!(size, channel_buffer, "LocalCluster::new: called");
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::channel(channel_buffer.max(1))).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| {
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect();
                LocalTransport {
                    rank,
                    size,
                    peers,
                    mailbox: Mailbox::new(rx),
                }
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LocalCluster`]
pub struct LocalTransport {
    rank: Rank,
    size: usize,
    peers: Vec<Option<mpsc::Sender<Envelope>>>,
    mailbox: Mailbox,
}

#[async_trait]
impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, to: Rank, message: Message) -> Result<(), TransportError> {
        let tx = self
            .peers
            .get(to)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer { from: self.rank, rank: to })?;

        tx.send(Envelope {
            from: self.rank,
            message,
        })
        .await
        .map_err(|_| TransportError::Closed(Source::Rank(to)))
    }

    async fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        self.mailbox.recv(from).await
    }

    fn probe(&mut self, from: Rank) -> Result<bool, TransportError> {
        self.mailbox.probe(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Assignment;

    #[tokio::test]
    async fn test_cluster_ranks() {
        let cluster = LocalCluster::new(3, 4);

        assert_eq!(cluster.len(), 3);
        for (i, t) in cluster.iter().enumerate() {
            assert_eq!(t.rank(), i);
            assert_eq!(t.size(), 3);
        }
        assert_eq!(cluster[0].workers().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_send_and_recv_any() {
        let mut cluster = LocalCluster::new(3, 4);
        let mut w2 = cluster.pop().unwrap();
        let mut w1 = cluster.pop().unwrap();
        let mut coord = cluster.pop().unwrap();

        w2.send(0, Message::Ready).await.unwrap();
        w1.send(0, Message::Ready).await.unwrap();

        let first = coord.recv(Source::Any).await.unwrap();
        let second = coord.recv(Source::Any).await.unwrap();
        assert_eq!(first.from, 2);
        assert_eq!(second.from, 1);

        coord.send(1, Message::Assign(Assignment::Shutdown)).await.unwrap();
        let got = w1.recv(Source::Rank(0)).await.unwrap();
        assert_eq!(got.message, Message::Assign(Assignment::Shutdown));
    }

    #[tokio::test]
    async fn test_send_to_self_is_rejected() {
        let mut cluster = LocalCluster::new(2, 4);
        let err = cluster[0].send(0, Message::Ready).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer { from: 0, rank: 0 }));

        let err = cluster[0].send(5, Message::Ready).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer { rank: 5, .. }));
    }

    #[tokio::test]
    async fn test_probe_per_peer() {
        let mut cluster = LocalCluster::new(3, 4);
        cluster[2].send(0, Message::Ready).await.unwrap();

        assert!(!cluster[0].probe(1).unwrap());
        assert!(cluster[0].probe(2).unwrap());
    }

    #[tokio::test]
    async fn test_recv_after_all_peers_dropped() {
        let mut cluster = LocalCluster::new(2, 4);
        let worker = cluster.pop().unwrap();
        let mut coord = cluster.pop().unwrap();
        drop(worker);

        let err = coord.recv(Source::Any).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(Source::Any)));
    }
}
