//! Session registry implementation
//!
//! Maps device ids to their sessions and routes device events to them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::device::{DeviceClient, DeviceEvent};
use crate::error::Result;
use crate::memory::{MemoryConfig, MemoryCoordinator};
use crate::session::{SessionConfig, StreamSession};
use crate::stats::SessionStats;

/// Central registry of streaming sessions, one per device
///
/// Thread-safe via `RwLock`. Event routing only needs read access.
pub struct StreamManager {
    /// Map of device id to session
    sessions: RwLock<HashMap<String, StreamSession>>,

    device: Arc<dyn DeviceClient>,

    memory: Arc<MemoryCoordinator>,

    /// Configuration for new sessions
    config: SessionConfig,
}

impl StreamManager {
    /// Create a manager with default session and memory configuration
    pub fn new(device: Arc<dyn DeviceClient>) -> Self {
        Self::with_config(
            device,
            MemoryCoordinator::new(MemoryConfig::default()),
            SessionConfig::default(),
        )
    }

    /// Create a manager sharing an existing memory coordinator
    pub fn with_config(
        device: Arc<dyn DeviceClient>,
        memory: Arc<MemoryCoordinator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            device,
            memory,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryCoordinator> {
        &self.memory
    }

    /// Get the session for a device, creating it if needed
    pub async fn session(&self, device_id: &str) -> StreamSession {
        if let Some(session) = self.sessions.read().await.get(device_id) {
            if !session.is_closed() {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(device_id) {
            if !session.is_closed() {
                return session.clone();
            }
        }

        let session = StreamSession::spawn(
            device_id,
            self.config.clone(),
            Arc::clone(&self.device),
            Arc::clone(&self.memory),
        );
        sessions.insert(device_id.to_string(), session.clone());

        tracing::debug!(device = %device_id, sessions = sessions.len(), "Session created");
        session
    }

    /// Start or attach to a device stream; returns the consumer endpoint
    pub async fn acquire_stream(&self, device_id: &str) -> Result<SocketAddr> {
        self.session(device_id).await.acquire().await
    }

    /// Release a device stream; unknown devices are a no-op
    pub async fn release_stream(&self, device_id: &str, reason: &str) -> Result<()> {
        let session = self.sessions.read().await.get(device_id).cloned();
        match session {
            Some(session) => session.release(reason).await,
            None => Ok(()),
        }
    }

    /// Route a device event to its session
    ///
    /// Events for devices without a session are dropped.
    pub async fn dispatch(&self, event: DeviceEvent) -> Result<()> {
        let sessions = self.sessions.read().await;
        match sessions.get(event.device_id()) {
            Some(session) => session.handle_event(event),
            None => {
                tracing::trace!(device = %event.device_id(), "Event for unknown device dropped");
                Ok(())
            }
        }
    }

    /// Spawn a task that dispatches events from a channel
    ///
    /// The task ends when the sender side is dropped.
    pub fn spawn_event_router(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<DeviceEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let device_id = event.device_id().to_string();
                if let Err(e) = manager.dispatch(event).await {
                    tracing::warn!(device = %device_id, error = %e, "Failed to dispatch event");
                }
            }
            tracing::debug!("Event router stopped");
        })
    }

    /// Statistics for one device
    pub async fn stats(&self, device_id: &str) -> Option<SessionStats> {
        let session = self.sessions.read().await.get(device_id).cloned()?;
        session.stats().await.ok()
    }

    /// Statistics for every session
    pub async fn all_stats(&self) -> Vec<SessionStats> {
        let sessions: Vec<StreamSession> = self.sessions.read().await.values().cloned().collect();
        let mut stats = Vec::with_capacity(sessions.len());
        for session in sessions {
            if let Ok(s) = session.stats().await {
                stats.push(s);
            }
        }
        stats
    }

    /// Get total number of sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Release every stream and drop all sessions
    pub async fn shutdown(&self) {
        let sessions: Vec<StreamSession> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        tracing::info!(sessions = sessions.len(), "Shutting down stream manager");

        for session in sessions {
            if let Err(e) = session.release("shutdown").await {
                tracing::debug!(device = %session.device_id(), error = %e, "Release during shutdown failed");
            }
        }
    }
}
