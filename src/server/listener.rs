//! Loopback stream listener
//!
//! Owns the TCP accept loop for one session. Accepted sockets are configured
//! and handed to a callback; the session decides what to do with them.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::error::{Result, SessionError};
use crate::server::config::ServerConfig;

/// A bound, not yet accepting, stream listener
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
}

impl StreamListener {
    /// Bind on loopback according to the configuration
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = config.effective_bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SessionError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        tracing::debug!(addr = %local_addr, "Stream listener bound");

        Ok(Self {
            listener,
            local_addr,
            config: config.clone(),
        })
    }

    /// Address consumers should connect to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start accepting in a background task
    ///
    /// `on_accept` returns `false` when the owner is gone, which ends the
    /// loop. Aborting the returned handle closes the listener.
    pub fn spawn<F>(self, mut on_accept: F) -> JoinHandle<()>
    where
        F: FnMut(TcpStream, SocketAddr) -> bool + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((socket, peer_addr)) => {
                        if let Err(e) = self.configure_socket(&socket) {
                            tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure socket");
                            continue;
                        }
                        tracing::debug!(addr = %self.local_addr, peer = %peer_addr, "New consumer connection");
                        if !on_accept(socket, peer_addr) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(addr = %self.local_addr, error = %e, "Failed to accept connection");
                    }
                }
            }
            tracing::debug!(addr = %self.local_addr, "Stream listener closed");
        })
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_loopback() {
        let listener = StreamListener::bind(&ServerConfig::default()).await.unwrap();
        let addr = listener.local_addr();

        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_accept_forwards_sockets() {
        let listener = StreamListener::bind(&ServerConfig::default()).await.unwrap();
        let addr = listener.local_addr();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = listener.spawn(move |socket, peer| tx.send((socket, peer)).is_ok());

        let client = TcpStream::connect(addr).await.unwrap();
        let (_socket, peer) = rx.recv().await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap());

        task.abort();
    }

    #[tokio::test]
    async fn test_abort_closes_listener() {
        let listener = StreamListener::bind(&ServerConfig::default()).await.unwrap();
        let addr = listener.local_addr();

        let task = listener.spawn(|_, _| true);
        task.abort();
        let _ = task.await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
