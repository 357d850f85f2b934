//! Statistics for streaming sessions

use std::net::SocketAddr;
use std::time::Duration;

use crate::session::state::StreamPhase;

/// Running counters owned by a session
///
/// Counters survive restarts of the same session; buffer occupancy is
/// sampled when a [`SessionStats`] snapshot is taken.
#[derive(Debug, Clone, Default)]
pub struct StreamCounters {
    /// Raw video bytes received
    pub video_bytes: u64,
    /// Raw audio bytes received
    pub audio_bytes: u64,
    /// NAL units accepted into the buffer
    pub video_units: u64,
    /// Units rejected (undersized, partitioned, or before the first IDR)
    pub dropped_units: u64,
    /// Units evicted by the buffer ceiling
    pub evicted_units: u64,
    /// Units and audio frames written to a consumer
    pub forwarded: u64,
    /// IDR units received
    pub keyframes: u64,
    /// Audio frames buffered
    pub audio_frames: u64,
    /// Consumers accepted
    pub consumers_served: u64,
    /// Consumers cut off for falling too far behind
    pub consumers_dropped: u64,
    /// Memory cleanups that removed something
    pub cleanups_applied: u64,
    /// Keepalive fillers written
    pub keepalives_sent: u64,
}

/// Snapshot of one session
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub device_id: String,
    pub phase: StreamPhase,
    /// Listener address, while one is bound
    pub endpoint: Option<SocketAddr>,
    pub has_consumer: bool,
    /// Bytes waiting for the current consumer's socket
    pub consumer_backlog: usize,
    /// Time since the current start
    pub uptime: Duration,
    pub counters: StreamCounters,
    pub buffered_video_units: usize,
    pub buffered_audio_frames: usize,
    /// Bytes held across unit, frame and assembly buffers
    pub buffered_bytes: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u8>,
}

impl SessionStats {
    /// Average inbound bitrate in bits per second over the uptime
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            ((self.counters.video_bytes + self.counters.audio_bytes) * 8) / secs
        } else {
            0
        }
    }

    /// Units per second over the uptime
    pub fn unit_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.counters.video_units as f64 / secs
        } else {
            0.0
        }
    }
}
