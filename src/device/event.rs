//! Events delivered by the device channel

use bytes::Bytes;

use crate::error::MediaError;

/// Stream geometry reported alongside video data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoMetadata {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }

    /// Reject non-positive dimensions and frame rates outside 1..=120
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidVideoMetadata(format!(
                "dimensions {}x{}",
                self.width, self.height
            )));
        }
        if !(1.0..=120.0).contains(&self.fps) {
            return Err(MediaError::InvalidVideoMetadata(format!(
                "frame rate {}",
                self.fps
            )));
        }
        Ok(())
    }
}

/// Codec parameters reported alongside audio data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMetadata {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioMetadata {
    pub fn new(codec: impl Into<String>, sample_rate: u32, channels: u8) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            channels,
        }
    }

    /// Whether the codec name denotes AAC
    pub fn is_aac(&self) -> bool {
        let codec = self.codec.to_ascii_lowercase();
        codec == "aac" || codec.starts_with("aac") || codec == "mp4a"
    }
}

/// Something that happened on a device channel
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    VideoData {
        device_id: String,
        data: Bytes,
        metadata: Option<VideoMetadata>,
    },
    AudioData {
        device_id: String,
        data: Bytes,
        metadata: Option<AudioMetadata>,
    },
    Connected {
        device_id: String,
    },
    Disconnected {
        device_id: String,
    },
}

impl DeviceEvent {
    /// Device the event belongs to
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::VideoData { device_id, .. }
            | DeviceEvent::AudioData { device_id, .. }
            | DeviceEvent::Connected { device_id }
            | DeviceEvent::Disconnected { device_id } => device_id,
        }
    }

    pub fn video(device_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        DeviceEvent::VideoData {
            device_id: device_id.into(),
            data: data.into(),
            metadata: None,
        }
    }

    pub fn audio(device_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        DeviceEvent::AudioData {
            device_id: device_id.into(),
            data: data.into(),
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_metadata_validation() {
        assert!(VideoMetadata::new(1920, 1080, 30.0).validate().is_ok());
        assert!(VideoMetadata::new(0, 1080, 30.0).validate().is_err());
        assert!(VideoMetadata::new(1920, 0, 30.0).validate().is_err());
        assert!(VideoMetadata::new(1920, 1080, 0.5).validate().is_err());
        assert!(VideoMetadata::new(1920, 1080, 121.0).validate().is_err());
        assert!(VideoMetadata::new(1920, 1080, 120.0).validate().is_ok());
    }

    #[test]
    fn test_audio_codec_detection() {
        assert!(AudioMetadata::new("AAC", 16000, 1).is_aac());
        assert!(AudioMetadata::new("aac_lc", 16000, 1).is_aac());
        assert!(!AudioMetadata::new("opus", 48000, 2).is_aac());
    }

    #[test]
    fn test_device_id() {
        let event = DeviceEvent::video("cam-1", vec![0u8; 4]);
        assert_eq!(event.device_id(), "cam-1");

        let event = DeviceEvent::Disconnected {
            device_id: "cam-2".into(),
        };
        assert_eq!(event.device_id(), "cam-2");
    }
}
