//! Session actor
//!
//! One task per device owns everything mutable about its stream: the
//! buffers, the listener, the current consumer and the timers. Everything
//! else talks to it through [`Command`]s.
//!
//! ```text
//!   DeviceEvent ──► StreamSession ──► Command ──► SessionActor ──► Consumer ──► TCP
//!                                        ▲            │
//!   MemoryCoordinator ── CleanupRequest ─┘            └── DeviceClient (stop)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::device::client::bounded;
use crate::device::{AudioMetadata, DeviceClient, VideoMetadata};
use crate::error::{MediaError, Result, SessionError};
use crate::media::aac::{split_adts, AudioSpecificConfig};
use crate::media::buffer::MediaBuffers;
use crate::media::h264::{NalUnit, NaluType, SpsInfo, MIN_NAL_UNIT_LEN};
use crate::media::mp4::{build_init_segment, VideoTrackConfig};
use crate::memory::{CleanupHandler, CleanupRequest, MemoryCoordinator};
use crate::server::{Consumer, ConsumerExit, SendError, StreamListener};
use crate::session::config::SessionConfig;
use crate::session::state::{StreamPhase, StreamState};
use crate::stats::{SessionStats, StreamCounters};

/// Access unit delimiter written to an idle consumer
pub const KEEPALIVE_FILLER: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];

/// Messages handled by the session actor
pub(crate) enum Command {
    Acquire {
        remote_streaming: bool,
        reply: oneshot::Sender<Result<AcquirePlan>>,
    },
    Video {
        data: Bytes,
        metadata: Option<VideoMetadata>,
    },
    Audio {
        data: Bytes,
        metadata: Option<AudioMetadata>,
    },
    Cleanup(CleanupRequest),
    ConsumerAccepted {
        socket: TcpStream,
        peer: SocketAddr,
    },
    ConsumerClosed {
        id: u64,
        exit: ConsumerExit,
    },
    Release {
        reason: String,
        reply: Option<oneshot::Sender<()>>,
    },
    ReleaseFinished,
    Stats(oneshot::Sender<SessionStats>),
}

/// What `acquire` has to do after the actor answers
pub(crate) enum AcquirePlan {
    /// Existing listener reused, no device command needed
    Reused(SocketAddr),
    /// Fresh start; the caller issues the start command and waits for data
    Started {
        endpoint: SocketAddr,
        first_data: watch::Receiver<bool>,
    },
}

/// Forwards memory cleanup requests into the actor
struct SessionCleanup {
    device_id: String,
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl CleanupHandler for SessionCleanup {
    fn on_cleanup(&self, request: &CleanupRequest) -> Result<()> {
        let Some(tx) = self.tx.upgrade() else {
            return Err(SessionError::Closed(self.device_id.clone()).into());
        };
        tx.send(Command::Cleanup(*request))
            .map_err(|_| SessionError::Closed(self.device_id.clone()))?;
        Ok(())
    }
}

struct ActiveListener {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

pub(crate) struct SessionActor {
    state: StreamState,
    config: SessionConfig,
    device: Arc<dyn DeviceClient>,
    memory: Arc<MemoryCoordinator>,
    buffers: MediaBuffers,
    counters: StreamCounters,
    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::WeakUnboundedSender<Command>,
    listener: Option<ActiveListener>,
    consumer: Option<Consumer>,
    next_consumer_id: u64,
    /// Startup or no-data deadline
    data_deadline: Option<Instant>,
    /// Grace-delayed release after the consumer left
    release_deadline: Option<Instant>,
    release_waiters: Vec<oneshot::Sender<()>>,
    deferred_acquires: Vec<oneshot::Sender<Result<AcquirePlan>>>,
    first_data: watch::Sender<bool>,
    /// Restarted whenever a consumer attaches
    keepalive: Interval,
}

impl SessionActor {
    pub(crate) fn new(
        device_id: String,
        config: SessionConfig,
        device: Arc<dyn DeviceClient>,
        memory: Arc<MemoryCoordinator>,
        rx: mpsc::UnboundedReceiver<Command>,
        tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let buffers = MediaBuffers::new(config.max_video_units, config.max_audio_bytes);
        let (first_data, _) = watch::channel(false);
        let mut keepalive = tokio::time::interval(config.server.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            state: StreamState::new(device_id),
            config,
            device,
            memory,
            buffers,
            counters: StreamCounters::default(),
            rx,
            tx,
            listener: None,
            consumer: None,
            next_consumer_id: 1,
            data_deadline: None,
            release_deadline: None,
            release_waiters: Vec::new(),
            deferred_acquires: Vec::new(),
            first_data,
            keepalive,
        }
    }

    /// Run until every handle is dropped
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                _ = sleep_until(self.data_deadline) => self.on_data_timeout(),
                _ = sleep_until(self.release_deadline) => self.on_grace_elapsed(),
                _ = self.keepalive.tick(), if self.consumer.is_some() => self.on_keepalive(),
            }
        }

        if self.state.is_live() {
            self.begin_release("session dropped".into(), None);
        }
        tracing::debug!(device = %self.state.device_id, "Session actor stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Acquire {
                remote_streaming,
                reply,
            } => self.on_acquire(remote_streaming, reply).await,
            Command::Video { data, metadata } => self.on_video(data, metadata),
            Command::Audio { data, metadata } => self.on_audio(data, metadata),
            Command::Cleanup(request) => self.on_cleanup(request),
            Command::ConsumerAccepted { socket, peer } => self.on_consumer(socket, peer),
            Command::ConsumerClosed { id, exit } => self.on_consumer_closed(id, exit),
            Command::Release { reason, reply } => self.begin_release(reason, reply),
            Command::ReleaseFinished => self.on_release_finished().await,
            Command::Stats(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn on_acquire(
        &mut self,
        remote_streaming: bool,
        reply: oneshot::Sender<Result<AcquirePlan>>,
    ) {
        let device_id = self.state.device_id.clone();

        if self.state.phase == StreamPhase::Stopping {
            tracing::debug!(device = %device_id, "Acquire deferred until release completes");
            self.deferred_acquires.push(reply);
            return;
        }

        if let Some(endpoint) = self.listener.as_ref().map(|l| l.addr) {
            if self.can_reuse(remote_streaming) {
                tracing::info!(
                    device = %device_id,
                    endpoint = %endpoint,
                    phase = %self.state.phase,
                    "Reusing existing stream"
                );
                let _ = reply.send(Ok(AcquirePlan::Reused(endpoint)));
                return;
            }
            tracing::info!(device = %device_id, "Existing stream is stale, restarting");
            self.local_cleanup();
            self.state.finish_stop();
        }

        let _ = reply.send(self.start().await);
    }

    fn can_reuse(&self, remote_streaming: bool) -> bool {
        if self.state.phase == StreamPhase::Starting || remote_streaming {
            return true;
        }
        !self.config.strict_reuse && self.buffers.video.has_keyframe()
    }

    async fn start(&mut self) -> Result<AcquirePlan> {
        self.buffers.clear();
        self.first_data.send_replace(false);
        self.state.start();

        let listener = match StreamListener::bind(&self.config.server).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(device = %self.state.device_id, error = %e, "Failed to bind stream listener");
                self.state.finish_stop();
                return Err(e);
            }
        };
        let endpoint = listener.local_addr();
        let tx = self.tx.clone();
        let task = listener.spawn(move |socket, peer| match tx.upgrade() {
            Some(tx) => tx.send(Command::ConsumerAccepted { socket, peer }).is_ok(),
            None => false,
        });
        self.listener = Some(ActiveListener {
            addr: endpoint,
            task,
        });

        self.data_deadline = Some(Instant::now() + self.config.startup_timeout);
        self.memory.register(
            self.state.device_id.clone(),
            Arc::new(SessionCleanup {
                device_id: self.state.device_id.clone(),
                tx: self.tx.clone(),
            }),
        );

        tracing::info!(device = %self.state.device_id, endpoint = %endpoint, "Stream starting");

        Ok(AcquirePlan::Started {
            endpoint,
            first_data: self.first_data.subscribe(),
        })
    }

    fn on_video(&mut self, data: Bytes, metadata: Option<VideoMetadata>) {
        if !self.state.is_live() {
            tracing::trace!(device = %self.state.device_id, bytes = data.len(), "Video while not streaming, dropped");
            return;
        }

        if let Some(meta) = metadata {
            if let Err(e) = meta.validate() {
                tracing::debug!(device = %self.state.device_id, error = %e, "Rejecting video chunk");
                self.counters.dropped_units += 1;
                return;
            }
            if self.state.video_metadata.is_none() {
                tracing::debug!(
                    device = %self.state.device_id,
                    width = meta.width,
                    height = meta.height,
                    fps = meta.fps,
                    "Video metadata"
                );
                self.state.video_metadata = Some(meta);
            }
        }

        self.counters.video_bytes += data.len() as u64;
        if self.state.on_video_data() {
            self.first_data.send_replace(true);
            tracing::info!(device = %self.state.device_id, "First video data received");
        }
        self.touch_data_deadline();

        let units = self.buffers.assemble_video(&data);

        tracing::trace!(
            device = %self.state.device_id,
            units = units.len(),
            pending = self.buffers.video_assembly.len(),
            "Video chunk parsed"
        );

        for unit in units {
            self.process_unit(unit);
        }
    }

    fn process_unit(&mut self, unit: NalUnit) {
        if unit.len() < MIN_NAL_UNIT_LEN {
            self.counters.dropped_units += 1;
            return;
        }

        match unit.kind() {
            Some(kind) if kind.is_partition() => {
                tracing::trace!(nal_type = unit.nal_type, "Dropping partitioned slice");
                self.counters.dropped_units += 1;
                return;
            }
            Some(NaluType::Idr) => {
                if self.state.awaiting_keyframe {
                    self.state.awaiting_keyframe = false;
                    tracing::info!(device = %self.state.device_id, "First keyframe received");
                }
                self.counters.keyframes += 1;
            }
            Some(NaluType::Slice) if self.state.awaiting_keyframe => {
                tracing::trace!("Dropping slice before first keyframe");
                self.counters.dropped_units += 1;
                return;
            }
            _ => {}
        }

        tracing::trace!(nal_type = unit.nal_type, len = unit.len(), "NAL unit");

        let data = unit.data.clone();
        let evicted = self.buffers.video.push(unit);
        self.counters.video_units += 1;
        if evicted > 0 {
            self.counters.evicted_units += evicted as u64;
            tracing::debug!(
                device = %self.state.device_id,
                evicted,
                buffered = self.buffers.video.len(),
                "Video buffer trimmed"
            );
        }
        self.forward(data);

        if self.state.tick_memory_check(self.config.memory_check_every) {
            self.memory.check_pressure();
        }
    }

    fn on_audio(&mut self, data: Bytes, metadata: Option<AudioMetadata>) {
        if !self.state.is_live() {
            tracing::trace!(device = %self.state.device_id, bytes = data.len(), "Audio while not streaming, dropped");
            return;
        }

        if let Some(meta) = metadata {
            self.cache_audio_metadata(meta);
        }

        self.counters.audio_bytes += data.len() as u64;
        // Only video ends the startup wait
        if self.state.phase == StreamPhase::Active {
            self.touch_data_deadline();
        }

        self.buffers.audio_assembly.extend_from_slice(&data);
        let assembled = self.buffers.audio_assembly.split().freeze();
        let split = split_adts(assembled);
        self.buffers.audio_assembly.extend_from_slice(&split.remainder);

        if self.state.audio_config.is_none() {
            if let Some(header) = split.header {
                match header.audio_config() {
                    Ok(config) => {
                        tracing::debug!(
                            device = %self.state.device_id,
                            profile = config.profile().map_or("unknown", |p| p.name()),
                            sample_rate = config.sampling_frequency,
                            channels = config.channels(),
                            "Audio config from ADTS header"
                        );
                        self.state.audio_config = Some(config);
                    }
                    Err(e) => tracing::debug!(error = %e, "Unusable ADTS header"),
                }
            }
        }

        for frame in split.frames {
            let dropped = self.buffers.audio.push(frame.clone());
            self.counters.audio_frames += 1;
            if dropped > 0 {
                tracing::debug!(device = %self.state.device_id, dropped, "Audio buffer trimmed");
            }
            self.forward(frame);
        }
    }

    fn cache_audio_metadata(&mut self, meta: AudioMetadata) {
        if let Some(known) = &self.state.audio_metadata {
            if *known != meta {
                tracing::debug!(
                    device = %self.state.device_id,
                    codec = %meta.codec,
                    sample_rate = meta.sample_rate,
                    "Ignoring changed audio metadata"
                );
            }
            return;
        }

        if meta.is_aac() {
            match AudioSpecificConfig::new(meta.sample_rate, meta.channels) {
                Ok(config) => self.state.audio_config = Some(config),
                Err(e) => tracing::debug!(device = %self.state.device_id, error = %e, "No audio track"),
            }
        } else {
            let e = MediaError::UnsupportedAudioCodec(meta.codec.clone());
            tracing::debug!(device = %self.state.device_id, error = %e, "No audio track");
        }
        tracing::debug!(
            device = %self.state.device_id,
            codec = %meta.codec,
            sample_rate = meta.sample_rate,
            channels = meta.channels,
            "Audio metadata"
        );
        self.state.audio_metadata = Some(meta);
    }

    fn forward(&mut self, data: Bytes) {
        let Some(consumer) = &self.consumer else {
            return;
        };
        match consumer.send(data) {
            Ok(()) => self.counters.forwarded += 1,
            Err(e @ SendError::Backlog { .. }) => self.drop_stalled_consumer(e),
            // The writer reports its own exit
            Err(SendError::Closed) => {}
        }
    }

    /// Cut off a consumer that stopped reading; the session keeps running
    fn drop_stalled_consumer(&mut self, reason: SendError) {
        let Some(consumer) = self.consumer.take() else {
            return;
        };
        tracing::warn!(
            device = %self.state.device_id,
            peer = %consumer.peer_addr(),
            error = %reason,
            "Dropping consumer that stopped reading"
        );
        consumer.close();
        self.counters.consumers_dropped += 1;
        self.schedule_release();
    }

    fn touch_data_deadline(&mut self) {
        self.data_deadline = Some(Instant::now() + self.config.no_data_timeout);
    }

    fn on_cleanup(&mut self, request: CleanupRequest) {
        if !self.state.is_live() {
            return;
        }
        let outcome = self.buffers.apply_cleanup(request.level);
        if outcome.is_noop() {
            tracing::debug!(device = %self.state.device_id, level = %request.level, "Cleanup no-op");
            return;
        }
        self.counters.cleanups_applied += 1;
        tracing::debug!(
            device = %self.state.device_id,
            level = %request.level,
            video_units = outcome.video_units,
            audio_frames = outcome.audio_frames,
            video_assembly_bytes = outcome.video_assembly_bytes,
            audio_assembly_bytes = outcome.audio_assembly_bytes,
            "Cleanup applied"
        );
    }

    fn on_consumer(&mut self, socket: TcpStream, peer: SocketAddr) {
        if !self.state.is_live() || self.listener.is_none() {
            tracing::debug!(peer = %peer, "Consumer arrived after release, closing");
            return;
        }

        if let Some(previous) = self.consumer.take() {
            tracing::info!(
                device = %self.state.device_id,
                previous = %previous.peer_addr(),
                "Replacing current consumer"
            );
            previous.close();
        }
        if self.release_deadline.take().is_some() {
            tracing::info!(device = %self.state.device_id, "Consumer reconnected, pending release cancelled");
        }

        let id = self.next_consumer_id;
        self.next_consumer_id += 1;
        self.keepalive.reset();
        let tx = self.tx.clone();
        let max_backlog = self.config.server.max_consumer_backlog;
        let consumer = Consumer::spawn(id, socket, peer, max_backlog, move |id, exit| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ConsumerClosed { id, exit });
            }
        });
        self.counters.consumers_served += 1;

        let with_init = match self.init_segment() {
            Ok(init) => consumer.send(init).is_ok(),
            Err(e) => {
                tracing::debug!(device = %self.state.device_id, error = %e, "No init segment, raw stream only");
                false
            }
        };
        let catchup = self.buffers.video.catchup_units();
        let units = catchup.len();
        for unit in catchup {
            // A backlog here surfaces on the next forwarded unit
            if consumer.send(unit.data).is_err() {
                break;
            }
        }

        tracing::info!(
            device = %self.state.device_id,
            peer = %peer,
            init = with_init,
            units,
            "Consumer attached"
        );
        self.consumer = Some(consumer);
    }

    /// fMP4 header for the buffered parameter sets
    ///
    /// Geometry comes from validated metadata, or from the SPS itself.
    fn init_segment(&self) -> Result<Bytes> {
        let sps = self
            .buffers
            .video
            .latest_sps()
            .ok_or(MediaError::MissingParameterSet("SPS"))?;
        let pps = self
            .buffers
            .video
            .latest_pps()
            .ok_or(MediaError::MissingParameterSet("PPS"))?;

        let (width, height) = match self.state.video_metadata {
            Some(meta) => (meta.width, meta.height),
            None => {
                let info = SpsInfo::parse(sps.payload())?;
                (info.width, info.height)
            }
        };

        let video = VideoTrackConfig {
            sps: sps.data.slice(sps.start_code_len..),
            pps: pps.data.slice(pps.start_code_len..),
            width,
            height,
        };
        build_init_segment(&video, self.state.audio_config.as_ref())
    }

    fn on_consumer_closed(&mut self, id: u64, exit: ConsumerExit) {
        if self.consumer.as_ref().map(|c| c.id()) != Some(id) {
            return;
        }
        self.consumer = None;

        match &exit {
            ConsumerExit::Eof => {
                tracing::info!(device = %self.state.device_id, "Consumer disconnected")
            }
            ConsumerExit::Error(e) => {
                tracing::warn!(device = %self.state.device_id, error = %e, "Consumer connection failed")
            }
        }

        self.schedule_release();
    }

    fn schedule_release(&mut self) {
        if self.state.is_live() {
            self.release_deadline = Some(Instant::now() + self.config.disconnect_grace);
            tracing::debug!(
                device = %self.state.device_id,
                grace_ms = self.config.disconnect_grace.as_millis() as u64,
                "Release scheduled"
            );
        }
    }

    fn on_grace_elapsed(&mut self) {
        self.release_deadline = None;
        if self.consumer.is_none() {
            self.begin_release("consumer disconnected".into(), None);
        }
    }

    fn on_data_timeout(&mut self) {
        self.data_deadline = None;
        let reason = if self.state.phase == StreamPhase::Starting {
            "startup timeout"
        } else {
            "no data timeout"
        };
        tracing::warn!(device = %self.state.device_id, reason, "Stream timed out");
        self.begin_release(reason.into(), None);
    }

    fn on_keepalive(&mut self) {
        let interval = self.config.server.keepalive_interval;
        let idle = self
            .buffers
            .video
            .last_push()
            .map_or(true, |at| at.elapsed() >= interval);
        if !idle {
            return;
        }
        let Some(consumer) = &self.consumer else {
            return;
        };
        match consumer.send(Bytes::from_static(&KEEPALIVE_FILLER)) {
            Ok(()) => {
                self.counters.keepalives_sent += 1;
                tracing::trace!(device = %self.state.device_id, "Keepalive sent");
            }
            Err(e @ SendError::Backlog { .. }) => self.drop_stalled_consumer(e),
            Err(SendError::Closed) => {}
        }
    }

    fn begin_release(&mut self, reason: String, reply: Option<oneshot::Sender<()>>) {
        match self.state.phase {
            StreamPhase::Stopping => {
                self.release_waiters.extend(reply);
                return;
            }
            StreamPhase::Idle => {
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return;
            }
            StreamPhase::Starting | StreamPhase::Active => {}
        }

        self.state.begin_stop();
        self.release_waiters.extend(reply);
        tracing::info!(device = %self.state.device_id, reason = %reason, "Releasing stream");

        self.local_cleanup();

        let device = Arc::clone(&self.device);
        let device_id = self.state.device_id.clone();
        let limit = self.config.device_command_timeout;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            stop_remote(device.as_ref(), &device_id, limit).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ReleaseFinished);
            }
        });
    }

    /// Drop every local resource; the remote side is handled separately
    fn local_cleanup(&mut self) {
        self.data_deadline = None;
        self.release_deadline = None;
        if let Some(consumer) = self.consumer.take() {
            consumer.close();
        }
        if let Some(listener) = self.listener.take() {
            listener.task.abort();
        }
        self.buffers.clear();
        self.first_data.send_replace(false);
        self.memory.unregister(&self.state.device_id);
    }

    async fn on_release_finished(&mut self) {
        if self.state.phase != StreamPhase::Stopping {
            return;
        }
        self.state.finish_stop();
        tracing::info!(device = %self.state.device_id, "Stream released");

        for waiter in self.release_waiters.drain(..) {
            let _ = waiter.send(());
        }
        for reply in std::mem::take(&mut self.deferred_acquires) {
            self.on_acquire(false, reply).await;
        }
    }

    fn snapshot(&self) -> SessionStats {
        let width = self.state.video_metadata.map(|m| m.width);
        let height = self.state.video_metadata.map(|m| m.height);
        SessionStats {
            device_id: self.state.device_id.clone(),
            phase: self.state.phase,
            endpoint: self.listener.as_ref().map(|l| l.addr),
            has_consumer: self.consumer.is_some(),
            uptime: self.state.uptime(),
            counters: self.counters.clone(),
            buffered_video_units: self.buffers.video.len(),
            buffered_audio_frames: self.buffers.audio.len(),
            buffered_bytes: self.buffers.total_bytes(),
            width,
            height,
            audio_sample_rate: self.state.audio_config.as_ref().map(|c| c.sampling_frequency),
            audio_channels: self.state.audio_config.as_ref().map(|c| c.channels()),
            consumer_backlog: self.consumer.as_ref().map_or(0, Consumer::queued_bytes),
        }
    }
}

/// Stop the remote stream if the device still reports one
///
/// Each command is bounded by `limit`, so a hung device cannot hold the
/// session in `Stopping`.
async fn stop_remote(device: &dyn DeviceClient, device_id: &str, limit: Duration) {
    let status = bounded(device_id, "is_livestreaming", limit, device.is_livestreaming(device_id)).await;
    match status {
        Ok(false) => {
            tracing::debug!(device = %device_id, "Device not streaming, skipping stop");
            return;
        }
        Ok(true) => {}
        Err(e) => {
            tracing::warn!(device = %device_id, error = %e, "Stream status unknown, stopping anyway");
        }
    }
    let stopped = bounded(device_id, "stop_livestream", limit, device.stop_livestream(device_id)).await;
    if let Err(e) = stopped {
        tracing::warn!(device = %device_id, error = %e, "Stop command failed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Wait for the first video byte, polling every `poll` for at most `wait`
pub(crate) async fn wait_first_data(
    first_data: watch::Receiver<bool>,
    wait: Duration,
    poll: Duration,
) -> bool {
    let polling = async {
        loop {
            if *first_data.borrow() {
                return true;
            }
            if first_data.has_changed().is_err() {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    };
    tokio::time::timeout(wait, polling).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_first_data_signalled() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send_replace(true);
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let got = wait_first_data(rx, Duration::from_secs(1), Duration::from_millis(10)).await;
        assert!(got);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_first_data_times_out() {
        let (_tx, rx) = watch::channel(false);
        let got = wait_first_data(rx, Duration::from_secs(5), Duration::from_millis(100)).await;
        assert!(!got);
    }

    #[tokio::test]
    async fn test_wait_first_data_sender_gone() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let got = wait_first_data(rx, Duration::from_secs(5), Duration::from_millis(10)).await;
        assert!(!got);
    }

    #[test]
    fn test_keepalive_filler_is_aud() {
        let unit = NalUnit::from_annex_b(Bytes::from_static(&KEEPALIVE_FILLER)).unwrap();
        assert_eq!(unit.kind(), Some(NaluType::Aud));
        assert!(unit.len() >= MIN_NAL_UNIT_LEN);
    }
}
