//! Unix domain socket transport
//!
//! Star topology: the coordinator binds a socket and every worker process
//! connects to it. The coordinator assigns ranks 1..size in accept order and
//! tells each worker its rank with a `welcome` frame. Workers can only talk
//! to the coordinator, which is all the scheduling protocol needs.
//!
//! Frames are newline-delimited JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::mailbox::Mailbox;
use super::{COORDINATOR, Envelope, Message, Rank, Source, Transport, TransportError};

/// Delay between connection attempts while the coordinator is not up yet
const CONNECT_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "kebab-case")]
enum Frame {
    Welcome { rank: Rank, size: usize },
    Message { message: Message },
}

/// Endpoint of a multi-process run over a Unix socket
pub struct SocketTransport {
    rank: Rank,
    size: usize,
    /// Write halves indexed by rank; `None` for unreachable ranks
    writers: Vec<Option<OwnedWriteHalf>>,
    mailbox: Mailbox,
    /// Socket file to remove on drop (coordinator only)
    socket_path: Option<PathBuf>,
}

impl SocketTransport {
    /// Bind `path` and wait for `size - 1` workers to connect
    pub async fn listen(
        path: &Path,
        size: usize,
        accept_timeout: Duration,
        channel_buffer: usize,
    ) -> Result<Self, TransportError> {
        debug!(path = %path.display(), size, "SocketTransport::listen: called");
        let listener = bind(path)?;
        let (tx, rx) = mpsc::channel(channel_buffer.max(1));

        let mut writers = Vec::with_capacity(size);
        writers.push(None);

        for rank in 1..size {
            let (stream, _) = tokio::time::timeout(accept_timeout, listener.accept())
                .await
                .map_err(|_| {
                    TransportError::Timeout(format!(
                        "{} of {} workers connected within {:?}",
                        rank - 1,
                        size - 1,
                        accept_timeout
                    ))
                })??;

            let (read, mut write) = stream.into_split();
            write_frame(&mut write, &Frame::Welcome { rank, size }).await?;
            spawn_reader(rank, BufReader::new(read), tx.clone());
            writers.push(Some(write));
            info!(rank, "Worker connected");
        }

        Ok(Self {
            rank: COORDINATOR,
            size,
            writers,
            mailbox: Mailbox::new(rx),
            socket_path: Some(path.to_path_buf()),
        })
    }

    /// Connect to a coordinator at `path`, retrying until `connect_timeout`
    pub async fn connect(
        path: &Path,
        connect_timeout: Duration,
        channel_buffer: usize,
    ) -> Result<Self, TransportError> {
        debug!(path = %path.display(), "SocketTransport::connect: called");
        let stream = tokio::time::timeout(connect_timeout, connect_with_retry(path))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "could not connect to {} within {:?}",
                    path.display(),
                    connect_timeout
                ))
            })?;

        let (read, write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(TransportError::Closed(Source::Rank(COORDINATOR)));
        }
        let (rank, size) = match serde_json::from_str(line.trim())? {
            Frame::Welcome { rank, size } => (rank, size),
            Frame::Message { message } => {
                return Err(TransportError::unexpected(
                    &Envelope {
                        from: COORDINATOR,
                        message,
                    },
                    "welcome",
                ));
            }
        };
        info!(rank, size, "Joined run");

        let (tx, rx) = mpsc::channel(channel_buffer.max(1));
        spawn_reader(COORDINATOR, reader, tx);

        let mut writers: Vec<Option<OwnedWriteHalf>> = (0..size).map(|_| None).collect();
        if let Some(slot) = writers.get_mut(COORDINATOR) {
            *slot = Some(write);
        }

        Ok(Self {
            rank,
            size,
            writers,
            mailbox: Mailbox::new(rx),
            socket_path: None,
        })
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(path) = &self.socket_path
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            warn!(path = %path.display(), error = %e, "Failed to remove socket file");
        }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, to: Rank, message: Message) -> Result<(), TransportError> {
        let from = self.rank;
        let writer = self
            .writers
            .get_mut(to)
            .and_then(Option::as_mut)
            .ok_or(TransportError::UnknownPeer { from, rank: to })?;
        write_frame(writer, &Frame::Message { message }).await
    }

    async fn recv(&mut self, from: Source) -> Result<Envelope, TransportError> {
        self.mailbox.recv(from).await
    }

    fn probe(&mut self, from: Rank) -> Result<bool, TransportError> {
        self.mailbox.probe(from)
    }
}

/// Bind a listener, clearing a stale socket file from an earlier run
fn bind(path: &Path) -> Result<UnixListener, TransportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        debug!(path = %path.display(), "bind: removing stale socket");
        std::fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

async fn connect_with_retry(path: &Path) -> UnixStream {
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return stream,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "connect_with_retry: coordinator not ready");
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), TransportError> {
    let mut json = serde_json::to_vec(frame)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Forward frames from one peer into the shared inbox until the peer goes away
fn spawn_reader(from: Rank, reader: BufReader<OwnedReadHalf>, tx: mpsc::Sender<Envelope>) {
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<Frame>(&line) {
                    Ok(Frame::Message { message }) => {
                        if tx.send(Envelope { from, message }).await.is_err() {
                            break;
                        }
                    }
                    Ok(Frame::Welcome { .. }) => {
                        warn!(from, "Ignoring unexpected welcome frame");
                    }
                    Err(e) => {
                        warn!(from, error = %e, "Dropping connection after undecodable frame");
                        break;
                    }
                },
                Ok(None) => {
                    debug!(from, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(from, error = %e, "Read from peer failed");
                    break;
                }
            }
        }
    });
}
