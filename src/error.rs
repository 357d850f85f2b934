//! Error types
//!
//! Ingestion-path problems (undersized units, bad metadata) are logged and
//! dropped inside the session and never surface here. What does surface:
//! container-builder precondition failures, remote device command failures,
//! and session lifecycle failures.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Errors from the media layer (parsers and the init-segment builder)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("missing {0} parameter set")]
    MissingParameterSet(&'static str),

    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid SPS: {0}")]
    InvalidSps(&'static str),

    #[error("{kind} of {len} bytes does not fit avcC")]
    ParameterSetTooLong { kind: &'static str, len: usize },

    #[error("unsupported audio codec: {0}")]
    UnsupportedAudioCodec(String),

    #[error("unsupported audio sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(u8),

    #[error("invalid AAC config")]
    InvalidAacConfig,

    #[error("invalid video metadata: {0}")]
    InvalidVideoMetadata(String),
}

/// Errors from the session lifecycle
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session for device {0} is closed")]
    Closed(String),

    #[error("failed to bind stream listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by a [`DeviceClient`](crate::device::DeviceClient)
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("device {0} not found")]
    NotFound(String),

    #[error("device {device} command {command} failed: {reason}")]
    CommandFailed {
        device: String,
        command: &'static str,
        reason: String,
    },

    #[error("device client unavailable: {0}")]
    Unavailable(String),

    #[error("device {device} command {command} timed out after {after:?}")]
    Timeout {
        device: String,
        command: &'static str,
        after: std::time::Duration,
    },
}

impl DeviceError {
    /// Shorthand for a failed remote command
    pub fn command_failed(
        device: impl Into<String>,
        command: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        DeviceError::CommandFailed {
            device: device.into(),
            command,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_converts() {
        let err: Error = MediaError::MissingParameterSet("SPS").into();
        assert!(matches!(err, Error::Media(MediaError::MissingParameterSet("SPS"))));
        assert_eq!(err.to_string(), "media error: missing SPS parameter set");
    }

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::command_failed("T8410", "start_livestream", "already streaming");
        assert_eq!(
            err.to_string(),
            "device T8410 command start_livestream failed: already streaming"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
