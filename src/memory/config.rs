//! Memory coordinator configuration

use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Smallest base threshold accepted (50MB)
pub const MIN_THRESHOLD_BYTES: u64 = 50 * MB;

/// Default base threshold (120MB)
pub const DEFAULT_THRESHOLD_BYTES: u64 = 120 * MB;

/// Memory coordinator configuration options
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Base resident-memory threshold in bytes
    pub threshold_bytes: u64,

    /// How often the monitor samples memory
    pub monitor_interval: Duration,

    /// Minimum spacing between two gentle or two aggressive triggers
    pub cleanup_cooldown: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            monitor_interval: Duration::from_secs(10),
            cleanup_cooldown: Duration::from_secs(30),
        }
    }
}

impl MemoryConfig {
    /// Set the base threshold, clamped to at least 50MB
    pub fn threshold_bytes(mut self, bytes: u64) -> Self {
        self.threshold_bytes = bytes.max(MIN_THRESHOLD_BYTES);
        self
    }

    /// Set the base threshold in megabytes
    pub fn threshold_mb(self, mb: u64) -> Self {
        self.threshold_bytes(mb.saturating_mul(MB))
    }

    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn cleanup_cooldown(mut self, cooldown: Duration) -> Self {
        self.cleanup_cooldown = cooldown;
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_base(self.threshold_bytes)
    }
}

/// The three trigger points derived from the base threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// max(50MB, 0.75 x base)
    pub gentle: u64,
    /// base
    pub aggressive: u64,
    /// 1.25 x base
    pub emergency: u64,
}

impl Thresholds {
    pub fn from_base(base: u64) -> Self {
        Self {
            gentle: MIN_THRESHOLD_BYTES.max(base / 4 * 3),
            aggressive: base,
            emergency: base + base / 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.threshold_bytes, 120 * MB);
        assert_eq!(config.monitor_interval, Duration::from_secs(10));
        assert_eq!(config.cleanup_cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_default_thresholds() {
        let t = MemoryConfig::default().thresholds();
        assert_eq!(t.gentle, 90 * MB);
        assert_eq!(t.aggressive, 120 * MB);
        assert_eq!(t.emergency, 150 * MB);
    }

    #[test]
    fn test_threshold_floor() {
        let config = MemoryConfig::default().threshold_mb(10);
        assert_eq!(config.threshold_bytes, MIN_THRESHOLD_BYTES);

        let t = MemoryConfig::default().threshold_mb(60).thresholds();
        // 0.75 x 60MB = 45MB, floored to 50MB
        assert_eq!(t.gentle, 50 * MB);
        assert_eq!(t.emergency, 75 * MB);
    }

    #[test]
    fn test_builder_chaining() {
        let config = MemoryConfig::default()
            .threshold_mb(200)
            .monitor_interval(Duration::from_secs(1))
            .cleanup_cooldown(Duration::from_secs(5));
        assert_eq!(config.threshold_bytes, 200 * MB);
        assert_eq!(config.monitor_interval, Duration::from_secs(1));
        assert_eq!(config.cleanup_cooldown, Duration::from_secs(5));
    }
}
