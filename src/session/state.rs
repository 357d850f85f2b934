//! Stream state machine
//!
//! Tracks one device stream through `Idle -> Starting -> Active -> Stopping -> Idle`.

use std::time::{Duration, Instant};

use crate::device::{AudioMetadata, VideoMetadata};
use crate::media::aac::AudioSpecificConfig;

/// Stream lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// No device command issued, no listener
    Idle,
    /// Start issued, waiting for the first video byte
    Starting,
    /// Video data is flowing
    Active,
    /// Release in progress
    Stopping,
}

impl StreamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamPhase::Idle => "idle",
            StreamPhase::Starting => "starting",
            StreamPhase::Active => "active",
            StreamPhase::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete per-device stream state
#[derive(Debug)]
pub struct StreamState {
    /// Device this stream belongs to
    pub device_id: String,

    /// Current phase
    pub phase: StreamPhase,

    /// When the current start began
    pub started_at: Option<Instant>,

    /// When the first video byte of the current start arrived
    pub first_data_at: Option<Instant>,

    /// Non-IDR slices are dropped until the first IDR arrives
    pub awaiting_keyframe: bool,

    /// First validated video metadata
    pub video_metadata: Option<VideoMetadata>,

    /// First audio metadata
    pub audio_metadata: Option<AudioMetadata>,

    /// Decoder config for the audio track, from metadata or ADTS
    pub audio_config: Option<AudioSpecificConfig>,

    /// Units processed since the last memory check
    pub units_since_check: u32,
}

impl StreamState {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            phase: StreamPhase::Idle,
            started_at: None,
            first_data_at: None,
            awaiting_keyframe: true,
            video_metadata: None,
            audio_metadata: None,
            audio_config: None,
            units_since_check: 0,
        }
    }

    /// Enter `Starting` from `Idle`, resetting per-start state
    pub fn start(&mut self) -> bool {
        if self.phase != StreamPhase::Idle {
            return false;
        }
        self.reset();
        self.phase = StreamPhase::Starting;
        self.started_at = Some(Instant::now());
        true
    }

    /// Record video arrival; returns true on the first byte of this start
    pub fn on_video_data(&mut self) -> bool {
        if self.phase == StreamPhase::Starting {
            self.phase = StreamPhase::Active;
            self.first_data_at = Some(Instant::now());
            return true;
        }
        false
    }

    /// Enter `Stopping`; false if already stopping or idle
    pub fn begin_stop(&mut self) -> bool {
        match self.phase {
            StreamPhase::Starting | StreamPhase::Active => {
                self.phase = StreamPhase::Stopping;
                true
            }
            StreamPhase::Idle | StreamPhase::Stopping => false,
        }
    }

    /// Complete a stop
    pub fn finish_stop(&mut self) {
        self.phase = StreamPhase::Idle;
        self.reset();
    }

    /// Whether the stream is starting or active
    pub fn is_live(&self) -> bool {
        matches!(self.phase, StreamPhase::Starting | StreamPhase::Active)
    }

    /// Time since the current start began
    pub fn uptime(&self) -> Duration {
        self.started_at.map(|at| at.elapsed()).unwrap_or_default()
    }

    /// Whether another unit pushes the counter to the check interval
    pub fn tick_memory_check(&mut self, every: u32) -> bool {
        self.units_since_check += 1;
        if self.units_since_check >= every.max(1) {
            self.units_since_check = 0;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.first_data_at = None;
        self.awaiting_keyframe = true;
        self.video_metadata = None;
        self.audio_metadata = None;
        self.audio_config = None;
        self.units_since_check = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_lifecycle() {
        let mut state = StreamState::new("cam-1");
        assert_eq!(state.phase, StreamPhase::Idle);

        assert!(state.start());
        assert_eq!(state.phase, StreamPhase::Starting);
        assert!(state.started_at.is_some());
        assert!(state.awaiting_keyframe);

        assert!(state.on_video_data());
        assert_eq!(state.phase, StreamPhase::Active);
        assert!(!state.on_video_data());

        assert!(state.begin_stop());
        assert_eq!(state.phase, StreamPhase::Stopping);
        assert!(!state.begin_stop());

        state.finish_stop();
        assert_eq!(state.phase, StreamPhase::Idle);
        assert!(state.started_at.is_none());
    }

    #[test]
    fn test_start_only_from_idle() {
        let mut state = StreamState::new("cam-1");
        assert!(state.start());
        assert!(!state.start());

        state.begin_stop();
        assert!(!state.start());
    }

    #[test]
    fn test_stop_from_idle_is_noop() {
        let mut state = StreamState::new("cam-1");
        assert!(!state.begin_stop());
        assert_eq!(state.phase, StreamPhase::Idle);
    }

    #[test]
    fn test_start_resets_metadata() {
        let mut state = StreamState::new("cam-1");
        state.start();
        state.video_metadata = Some(VideoMetadata::new(640, 480, 15.0));
        state.awaiting_keyframe = false;
        state.begin_stop();
        state.finish_stop();

        state.start();
        assert!(state.video_metadata.is_none());
        assert!(state.awaiting_keyframe);
    }

    #[test]
    fn test_memory_check_cadence() {
        let mut state = StreamState::new("cam-1");
        let fired: Vec<bool> = (0..10).map(|_| state.tick_memory_check(5)).collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 2);
        assert!(fired[4]);
        assert!(fired[9]);
    }
}
