//! AAC audio helpers
//!
//! Cameras deliver AAC either as bare access units or wrapped in ADTS.
//! For the init segment we need an AudioSpecificConfig, built from the
//! advertised sample rate and channel count, or lifted from the first ADTS
//! header when no metadata arrives.
//!
//! AudioSpecificConfig (2 bytes for AAC-LC):
//! ```text
//! +-----------------+--------------------+---------------+-------+
//! | audioObjectType | samplingFreqIndex  | channelConfig | flags |
//! | (5 bits)        | (4 bits)           | (4 bits)      | (3)   |
//! +-----------------+--------------------+---------------+-------+
//! ```
//!
//! ADTS header (7 bytes, no CRC):
//! ```text
//! syncword(12) id(1) layer(2) protection_absent(1) profile(2) freq(4)
//! private(1) channels(3) orig(1) home(1) copyright(2) frame_length(13)
//! fullness(11) frames(2)
//! ```

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AAC profile (audio object type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    /// AAC Main
    Main = 1,
    /// AAC LC (Low Complexity) - most common
    Lc = 2,
    /// AAC SSR (Scalable Sample Rate)
    Ssr = 3,
    /// AAC LTP (Long Term Prediction)
    Ltp = 4,
}

impl AacProfile {
    pub fn from_object_type(ot: u8) -> Option<Self> {
        match ot {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::Lc),
            3 => Some(AacProfile::Ssr),
            4 => Some(AacProfile::Ltp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AacProfile::Main => "AAC Main",
            AacProfile::Lc => "AAC LC",
            AacProfile::Ssr => "AAC SSR",
            AacProfile::Ltp => "AAC LTP",
        }
    }
}

/// Standard sampling frequencies by index
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// AudioSpecificConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Build an AAC-LC config from a sample rate and channel count
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self> {
        Self::with_profile(AacProfile::Lc, sample_rate, channels)
    }

    pub fn with_profile(profile: AacProfile, sample_rate: u32, channels: u8) -> Result<Self> {
        let index = SAMPLING_FREQUENCIES
            .iter()
            .position(|&f| f == sample_rate)
            .ok_or(MediaError::UnsupportedSampleRate(sample_rate))?;
        if channels == 0 || channels > 7 {
            return Err(MediaError::InvalidChannelCount(channels).into());
        }
        Ok(Self {
            audio_object_type: profile as u8,
            sampling_frequency_index: index as u8,
            sampling_frequency: sample_rate,
            channel_configuration: channels,
        })
    }

    /// Parse the leading two bytes of an AudioSpecificConfig
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacConfig.into());
        }

        let audio_object_type = (data[0] >> 3) & 0x1F;
        let sampling_frequency_index = ((data[0] & 0x07) << 1) | ((data[1] >> 7) & 0x01);
        let sampling_frequency = *SAMPLING_FREQUENCIES
            .get(sampling_frequency_index as usize)
            .ok_or(MediaError::InvalidAacConfig)?;
        let channel_configuration = (data[1] >> 3) & 0x0F;

        Ok(Self {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Serialize to the 2-byte form carried in `esds`
    pub fn to_bytes(&self) -> [u8; 2] {
        [
            (self.audio_object_type << 3) | (self.sampling_frequency_index >> 1),
            ((self.sampling_frequency_index & 0x01) << 7) | (self.channel_configuration << 3),
        ]
    }

    pub fn profile(&self) -> Option<AacProfile> {
        AacProfile::from_object_type(self.audio_object_type)
    }

    /// Channel count for the sample entry
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8, // 7.1
            n => n,
        }
    }
}

/// Fields of an ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    /// Header length (7 or 9 with CRC)
    pub header_len: usize,
    /// Full frame length including the header
    pub frame_len: usize,
}

impl AdtsHeader {
    /// Parse a header at the start of `data`; `None` if there is no syncword
    /// or fewer than 7 bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 || data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
            return None;
        }
        let protection_absent = data[1] & 0x01 == 1;
        let profile = ((data[2] >> 6) & 0x03) + 1;
        let sampling_frequency_index = (data[2] >> 2) & 0x0F;
        let channel_configuration = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);
        let frame_len = (((data[3] & 0x03) as usize) << 11)
            | ((data[4] as usize) << 3)
            | ((data[5] >> 5) as usize);
        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len < header_len {
            return None;
        }
        Some(Self {
            profile,
            sampling_frequency_index,
            channel_configuration,
            header_len,
            frame_len,
        })
    }

    /// The AudioSpecificConfig this header describes
    pub fn audio_config(&self) -> Result<AudioSpecificConfig> {
        let sampling_frequency = *SAMPLING_FREQUENCIES
            .get(self.sampling_frequency_index as usize)
            .ok_or(MediaError::InvalidAacConfig)?;
        Ok(AudioSpecificConfig {
            audio_object_type: self.profile,
            sampling_frequency_index: self.sampling_frequency_index,
            sampling_frequency,
            channel_configuration: self.channel_configuration,
        })
    }
}

/// Output of [`split_adts`]
#[derive(Debug, Clone, Default)]
pub struct AdtsSplit {
    /// Whole frames (ADTS header included)
    pub frames: Vec<Bytes>,
    /// Incomplete trailing frame
    pub remainder: Bytes,
    /// First header seen, if any
    pub header: Option<AdtsHeader>,
}

/// Cut an audio buffer into frames.
///
/// ADTS input is cut on frame length. Input that does not start with a
/// syncword is not ADTS and is returned whole as a single frame.
pub fn split_adts(data: Bytes) -> AdtsSplit {
    if data.is_empty() {
        return AdtsSplit::default();
    }
    let Some(first) = AdtsHeader::parse(&data) else {
        if data.len() < 7 && data[0] == 0xFF {
            // could be a header cut short by the event boundary
            return AdtsSplit {
                remainder: data,
                ..Default::default()
            };
        }
        return AdtsSplit {
            frames: vec![data],
            ..Default::default()
        };
    };

    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let Some(header) = AdtsHeader::parse(&data[offset..]) else {
            if data.len() - offset >= 7 {
                tracing::debug!(offset, "Lost ADTS sync, passing rest through");
                frames.push(data.slice(offset..));
                offset = data.len();
            }
            break;
        };
        if offset + header.frame_len > data.len() {
            break;
        }
        frames.push(data.slice(offset..offset + header.frame_len));
        offset += header.frame_len;
    }

    AdtsSplit {
        frames,
        remainder: data.slice(offset..),
        header: Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adts_frame(payload_len: usize) -> Vec<u8> {
        let frame_len = payload_len + 7;
        let mut frame = vec![
            0xFF,
            0xF1,
            (1 << 6) | (4 << 2), // LC, 44100
            (2 << 6) | ((frame_len >> 11) & 0x03) as u8,
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 0x07) << 5) | 0x1F) as u8,
            0xFC,
        ];
        frame.extend(std::iter::repeat(0x21).take(payload_len));
        frame
    }

    #[test]
    fn test_audio_specific_config_new() {
        let config = AudioSpecificConfig::new(44100, 2).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.to_bytes(), [0x12, 0x10]);
        assert_eq!(config.profile(), Some(AacProfile::Lc));
    }

    #[test]
    fn test_audio_specific_config_16k_mono() {
        let config = AudioSpecificConfig::new(16000, 1).unwrap();
        assert_eq!(config.to_bytes(), [0x14, 0x08]);
    }

    #[test]
    fn test_audio_specific_config_rejects_bad_params() {
        assert!(AudioSpecificConfig::new(44000, 2).is_err());
        assert!(AudioSpecificConfig::new(44100, 0).is_err());
        assert!(AudioSpecificConfig::new(44100, 9).is_err());
    }

    #[test]
    fn test_audio_specific_config_parse() {
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
        assert!(AudioSpecificConfig::parse(&[0x12]).is_err());
    }

    #[test]
    fn test_aac_profile_names() {
        assert_eq!(AacProfile::Lc.name(), "AAC LC");
        assert_eq!(AacProfile::from_object_type(5), None);
    }

    #[test]
    fn test_adts_header_parse() {
        let frame = adts_frame(20);
        let header = AdtsHeader::parse(&frame).unwrap();
        assert_eq!(header.profile, 2);
        assert_eq!(header.sampling_frequency_index, 4);
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(header.frame_len, 27);

        let config = header.audio_config().unwrap();
        assert_eq!(config.to_bytes(), [0x12, 0x10]);
    }

    #[test]
    fn test_split_adts_frames_and_remainder() {
        let mut data = adts_frame(10);
        data.extend(adts_frame(12));
        let partial = adts_frame(30);
        data.extend_from_slice(&partial[..15]);

        let split = split_adts(Bytes::from(data));
        assert_eq!(split.frames.len(), 2);
        assert_eq!(split.frames[0].len(), 17);
        assert_eq!(split.frames[1].len(), 19);
        assert_eq!(split.remainder.len(), 15);
        assert!(split.header.is_some());
    }

    #[test]
    fn test_split_raw_passthrough() {
        let split = split_adts(Bytes::from_static(&[0x21, 0x10, 0x05, 0x00]));
        assert_eq!(split.frames.len(), 1);
        assert!(split.remainder.is_empty());
        assert!(split.header.is_none());
    }

    #[test]
    fn test_split_short_header_is_kept() {
        let split = split_adts(Bytes::from_static(&[0xFF, 0xF1, 0x50]));
        assert!(split.frames.is_empty());
        assert_eq!(split.remainder.len(), 3);
    }
}
