//! Current consumer connection
//!
//! Each consumer gets a writer task fed by a channel, so the ingestion path
//! never waits on a slow socket. The channel is bounded by bytes rather than
//! messages: a consumer whose queue passes its backlog cap is refused
//! further data and the session drops it. The task reports back only when
//! the peer goes away on its own; a consumer closed by its session stays
//! silent.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why a consumer's writer task ended on its own
#[derive(Debug)]
pub enum ConsumerExit {
    /// Peer closed the connection
    Eof,
    /// Read or write failed
    Error(std::io::Error),
}

impl std::fmt::Display for ConsumerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerExit::Eof => f.write_str("peer closed connection"),
            ConsumerExit::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Why bytes could not be queued for a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The writer task has stopped
    #[error("consumer writer stopped")]
    Closed,

    /// The consumer is not reading fast enough
    #[error("{queued} bytes already queued, limit {limit}")]
    Backlog { queued: usize, limit: usize },
}

/// Handle to the connected consumer
#[derive(Debug)]
pub struct Consumer {
    id: u64,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Bytes>,
    queued: Arc<AtomicUsize>,
    max_backlog: usize,
    task: JoinHandle<()>,
}

impl Consumer {
    /// Spawn the writer task for an accepted socket
    ///
    /// At most `max_backlog` bytes may wait for the socket. `on_exit` runs
    /// once if the peer disconnects or the socket fails.
    pub fn spawn<F>(
        id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        max_backlog: usize,
        on_exit: F,
    ) -> Self
    where
        F: FnOnce(u64, ConsumerExit) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let writer_queued = Arc::clone(&queued);
        let task = tokio::spawn(async move {
            if let Some(exit) = run_writer(socket, rx, writer_queued).await {
                on_exit(id, exit);
            }
        });

        Self {
            id,
            peer_addr,
            tx,
            queued,
            max_backlog,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Bytes handed over but not yet written to the socket
    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Queue bytes for the consumer
    ///
    /// A single chunk larger than the cap is still accepted when nothing
    /// else is waiting.
    pub fn send(&self, data: Bytes) -> Result<(), SendError> {
        let len = data.len();
        let queued = self.queued.fetch_add(len, Ordering::AcqRel);
        if queued > 0 && queued + len > self.max_backlog {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            return Err(SendError::Backlog {
                queued,
                limit: self.max_backlog,
            });
        }
        if self.tx.send(data).is_err() {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            return Err(SendError::Closed);
        }
        Ok(())
    }

    /// Drop the connection immediately, discarding queued bytes
    pub fn close(self) {
        self.task.abort();
    }
}

async fn run_writer(
    socket: TcpStream,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    queued: Arc<AtomicUsize>,
) -> Option<ConsumerExit> {
    let (mut reader, mut writer) = socket.into_split();
    let mut scratch = [0u8; 512];

    loop {
        tokio::select! {
            data = rx.recv() => {
                let Some(data) = data else {
                    let _ = writer.shutdown().await;
                    return None;
                };
                let result = writer.write_all(&data).await;
                queued.fetch_sub(data.len(), Ordering::AcqRel);
                if let Err(e) = result {
                    return Some(ConsumerExit::Error(e));
                }
            }
            // Consumers never send anything meaningful; reads only detect hangup
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) => return Some(ConsumerExit::Eof),
                    Ok(_) => {}
                    Err(e) => return Some(ConsumerExit::Error(e)),
                }
            }
        }
    }
}
