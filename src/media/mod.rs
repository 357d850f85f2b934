//! Media handling for camera streams
//!
//! This module provides:
//! - Annex-B H.264 NAL unit splitting and SPS parsing
//! - AAC AudioSpecificConfig and ADTS framing
//! - fMP4 initialization segment building
//! - Frame buffering for late-joiner support and memory cleanup

pub mod aac;
pub mod buffer;
pub mod h264;
pub mod mp4;

pub use aac::{AacProfile, AdtsHeader, AudioSpecificConfig};
pub use buffer::{AudioBuffer, CleanupOutcome, FrameBuffer, MediaBuffers};
pub use h264::{drain_annex_b, split_annex_b, AnnexBSplit, NalUnit, NaluType, SpsInfo};
pub use mp4::{build_init_segment, VideoTrackConfig};
