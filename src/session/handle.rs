//! Public handle to a streaming session

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::device::client::bounded;
use crate::device::{AudioMetadata, DeviceClient, DeviceEvent, VideoMetadata};
use crate::error::{Result, SessionError};
use crate::memory::MemoryCoordinator;
use crate::session::config::SessionConfig;
use crate::session::stream::{wait_first_data, AcquirePlan, Command, SessionActor};
use crate::stats::SessionStats;

/// Cloneable handle to one device's session
///
/// The session actor runs until the last handle is dropped.
#[derive(Clone)]
pub struct StreamSession {
    device_id: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    device: Arc<dyn DeviceClient>,
    config: Arc<SessionConfig>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("device_id", &self.device_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StreamSession {
    /// Spawn the session actor for a device
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        device_id: impl Into<String>,
        config: SessionConfig,
        device: Arc<dyn DeviceClient>,
        memory: Arc<MemoryCoordinator>,
    ) -> Self {
        let device_id: String = device_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SessionActor::new(
            device_id.clone(),
            config.clone(),
            Arc::clone(&device),
            memory,
            rx,
            tx.downgrade(),
        );
        tokio::spawn(actor.run());

        Self {
            device_id: device_id.into(),
            tx,
            device,
            config: Arc::new(config),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Start streaming, or attach to the stream already running
    ///
    /// Returns the loopback endpoint consumers connect to. A fresh start
    /// issues the device start command and waits a bounded time for the
    /// first video byte. Neither a failed or hung command nor a silent
    /// device makes this fail.
    pub async fn acquire(&self) -> Result<SocketAddr> {
        let limit = self.config.device_command_timeout;
        let remote_streaming = match bounded(
            &self.device_id,
            "is_livestreaming",
            limit,
            self.device.is_livestreaming(&self.device_id),
        )
        .await
        {
            Ok(streaming) => streaming,
            Err(e) => {
                tracing::warn!(device = %self.device_id, error = %e, "Could not query stream status");
                false
            }
        };

        let plan = self
            .request(|reply| Command::Acquire {
                remote_streaming,
                reply,
            })
            .await??;

        let (endpoint, first_data) = match plan {
            AcquirePlan::Reused(endpoint) => return Ok(endpoint),
            AcquirePlan::Started {
                endpoint,
                first_data,
            } => (endpoint, first_data),
        };

        let started = bounded(
            &self.device_id,
            "start_livestream",
            limit,
            self.device.start_livestream(&self.device_id),
        )
        .await;
        if let Err(e) = started {
            tracing::warn!(device = %self.device_id, error = %e, "Start command failed, continuing");
        }

        let got_data = wait_first_data(
            first_data,
            self.config.first_data_wait,
            self.config.first_data_poll,
        )
        .await;
        if !got_data {
            tracing::warn!(
                device = %self.device_id,
                wait_ms = self.config.first_data_wait.as_millis() as u64,
                "No video data yet, returning endpoint anyway"
            );
        }

        tracing::info!(device = %self.device_id, endpoint = %endpoint, "Stream acquired");
        Ok(endpoint)
    }

    /// Stop the stream and tear down local resources
    ///
    /// Idempotent; resolves once the release in progress has finished.
    pub async fn release(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.request(|reply| Command::Release {
            reason,
            reply: Some(reply),
        })
        .await
    }

    /// Route a device event into the session
    pub fn handle_event(&self, event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::VideoData { data, metadata, .. } => self.push_video(data, metadata),
            DeviceEvent::AudioData { data, metadata, .. } => self.push_audio(data, metadata),
            DeviceEvent::Connected { .. } => {
                tracing::debug!(device = %self.device_id, "Device connected");
                Ok(())
            }
            DeviceEvent::Disconnected { .. } => {
                tracing::info!(device = %self.device_id, "Device disconnected");
                self.send(Command::Release {
                    reason: "device disconnected".into(),
                    reply: None,
                })
            }
        }
    }

    /// Feed a chunk of Annex-B video
    pub fn push_video(&self, data: Bytes, metadata: Option<VideoMetadata>) -> Result<()> {
        self.send(Command::Video { data, metadata })
    }

    /// Feed a chunk of audio
    pub fn push_audio(&self, data: Bytes, metadata: Option<AudioMetadata>) -> Result<()> {
        self.send(Command::Audio { data, metadata })
    }

    /// Snapshot of the session's state and counters
    pub async fn stats(&self) -> Result<SessionStats> {
        self.request(Command::Stats).await
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| SessionError::Closed(self.device_id.to_string()).into())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await
            .map_err(|_| SessionError::Closed(self.device_id.to_string()).into())
    }
}
