//! Session configuration

use std::time::Duration;

use crate::media::buffer::{DEFAULT_MAX_AUDIO_BYTES, DEFAULT_MAX_VIDEO_UNITS};
use crate::server::ServerConfig;

/// Per-session configuration options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Release if no video arrives this long after a start
    pub startup_timeout: Duration,

    /// Release if video stops arriving for this long
    pub no_data_timeout: Duration,

    /// Delay before releasing after the consumer goes away
    pub disconnect_grace: Duration,

    /// How long `acquire` waits for the first video byte
    pub first_data_wait: Duration,

    /// Poll granularity of that wait
    pub first_data_poll: Duration,

    /// Upper bound on each start, stop or status command sent to the device
    pub device_command_timeout: Duration,

    /// Video buffer unit-count ceiling
    pub max_video_units: usize,

    /// Audio buffer byte ceiling
    pub max_audio_bytes: usize,

    /// Ask the memory coordinator for a check every N video units
    pub memory_check_every: u32,

    /// Only reuse a listener when the device is confirmed streaming
    pub strict_reuse: bool,

    /// Listener settings
    pub server: ServerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            no_data_timeout: Duration::from_secs(30),
            disconnect_grace: Duration::from_secs(2),
            first_data_wait: Duration::from_secs(5),
            first_data_poll: Duration::from_millis(100),
            device_command_timeout: Duration::from_secs(10),
            max_video_units: DEFAULT_MAX_VIDEO_UNITS,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            memory_check_every: 5,
            strict_reuse: false,
            server: ServerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn no_data_timeout(mut self, timeout: Duration) -> Self {
        self.no_data_timeout = timeout;
        self
    }

    pub fn disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    pub fn first_data_wait(mut self, wait: Duration) -> Self {
        self.first_data_wait = wait;
        self
    }

    pub fn first_data_poll(mut self, poll: Duration) -> Self {
        self.first_data_poll = poll;
        self
    }

    pub fn device_command_timeout(mut self, timeout: Duration) -> Self {
        self.device_command_timeout = timeout;
        self
    }

    /// Set the video unit ceiling (at least 1)
    pub fn max_video_units(mut self, units: usize) -> Self {
        self.max_video_units = units.max(1);
        self
    }

    pub fn max_audio_bytes(mut self, bytes: usize) -> Self {
        self.max_audio_bytes = bytes;
        self
    }

    pub fn memory_check_every(mut self, units: u32) -> Self {
        self.memory_check_every = units.max(1);
        self
    }

    pub fn strict_reuse(mut self, strict: bool) -> Self {
        self.strict_reuse = strict;
        self
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();

        assert_eq!(config.startup_timeout, Duration::from_secs(30));
        assert_eq!(config.no_data_timeout, Duration::from_secs(30));
        assert_eq!(config.disconnect_grace, Duration::from_secs(2));
        assert_eq!(config.first_data_wait, Duration::from_secs(5));
        assert_eq!(config.first_data_poll, Duration::from_millis(100));
        assert_eq!(config.device_command_timeout, Duration::from_secs(10));
        assert_eq!(config.max_video_units, 15);
        assert_eq!(config.max_audio_bytes, 30 * 1024 * 1024);
        assert_eq!(config.memory_check_every, 5);
        assert!(!config.strict_reuse);
    }

    #[test]
    fn test_builder_floors() {
        let config = SessionConfig::default()
            .max_video_units(0)
            .memory_check_every(0);

        assert_eq!(config.max_video_units, 1);
        assert_eq!(config.memory_check_every, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SessionConfig::default()
            .startup_timeout(Duration::from_secs(1))
            .no_data_timeout(Duration::from_secs(2))
            .disconnect_grace(Duration::from_millis(300))
            .device_command_timeout(Duration::from_millis(750))
            .strict_reuse(true);

        assert_eq!(config.startup_timeout, Duration::from_secs(1));
        assert_eq!(config.no_data_timeout, Duration::from_secs(2));
        assert_eq!(config.disconnect_grace, Duration::from_millis(300));
        assert_eq!(config.device_command_timeout, Duration::from_millis(750));
        assert!(config.strict_reuse);
    }
}
