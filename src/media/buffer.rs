//! Frame buffers for late-joiner support
//!
//! A consumer that attaches mid-stream needs, in order:
//! 1. The parameter sets (SPS/PPS)
//! 2. The most recent keyframe (IDR)
//! 3. Whatever was buffered after it
//!
//! The video buffer is bounded by unit count. When it overflows, a
//! priority walk keeps the newest units plus one SPS, one PPS and one IDR,
//! so a late joiner can always be initialized. Audio is a plain FIFO
//! bounded by bytes.
//!
//! Under memory pressure [`MediaBuffers::apply_cleanup`] shrinks both
//! buffers and the raw assembly buffers at three severities.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::{Bytes, BytesMut};

use crate::media::h264::{drain_annex_b, NalUnit, NaluType};
use crate::memory::CleanupLevel;

/// Default unit-count ceiling for the video buffer
pub const DEFAULT_MAX_VIDEO_UNITS: usize = 15;

/// Units always kept by a priority walk
pub const KEEP_RECENT_UNITS: usize = 3;

/// Default byte ceiling for the audio buffer (30MB)
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 30 * 1024 * 1024;

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

/// Gentle: video assembly above this is cut to its tail
const GENTLE_VIDEO_ASSEMBLY_LIMIT: usize = 512 * KB;
const GENTLE_VIDEO_ASSEMBLY_KEEP: usize = 256 * KB;
/// Gentle: audio assembly above this is cut to its tail
const GENTLE_AUDIO_ASSEMBLY_LIMIT: usize = 256 * KB;
const GENTLE_AUDIO_ASSEMBLY_KEEP: usize = 128 * KB;
/// Aggressive: assembly buffers above these are dropped
const AGGRESSIVE_VIDEO_ASSEMBLY_LIMIT: usize = MB;
const AGGRESSIVE_AUDIO_ASSEMBLY_LIMIT: usize = 512 * KB;

/// Minimum sizes kept by the relative (gentle) shrink
const GENTLE_MIN_VIDEO_UNITS: usize = 3;
const GENTLE_MIN_AUDIO_FRAMES: usize = 2;
/// Caps applied by the aggressive level
const AGGRESSIVE_VIDEO_UNITS: usize = 3;
const AGGRESSIVE_AUDIO_FRAMES: usize = 2;

/// Bounded video NAL unit buffer
#[derive(Debug)]
pub struct FrameBuffer {
    units: VecDeque<NalUnit>,
    max_units: usize,
    size: usize,
    last_push: Option<Instant>,
}

impl FrameBuffer {
    /// Create a buffer with the default ceiling (15 units)
    pub fn new() -> Self {
        Self::with_max_units(DEFAULT_MAX_VIDEO_UNITS)
    }

    pub fn with_max_units(max_units: usize) -> Self {
        Self {
            units: VecDeque::with_capacity(max_units + 1),
            max_units: max_units.max(KEEP_RECENT_UNITS),
            size: 0,
            last_push: None,
        }
    }

    /// Append a unit, running the priority walk if over the ceiling.
    ///
    /// Returns the number of units evicted.
    pub fn push(&mut self, unit: NalUnit) -> usize {
        self.size += unit.len();
        self.units.push_back(unit);
        self.last_push = Some(Instant::now());

        if self.units.len() > self.max_units {
            self.retain_priority(KEEP_RECENT_UNITS)
        } else {
            0
        }
    }

    /// Keep the `keep_recent` newest units plus one SPS, one PPS and one IDR.
    ///
    /// The walk runs newest to oldest, so the IDR kept is the newest one,
    /// which lies in the recent tail whenever the tail has one. Relative
    /// order is preserved. Returns the number of units removed.
    pub fn retain_priority(&mut self, keep_recent: usize) -> usize {
        let len = self.units.len();
        if len <= keep_recent {
            return 0;
        }

        let mut keep = vec![false; len];
        let mut have_sps = false;
        let mut have_pps = false;
        let mut have_idr = false;

        for (pos, i) in (0..len).rev().enumerate() {
            if pos < keep_recent {
                keep[i] = true;
                match self.units[i].kind() {
                    Some(NaluType::Sps) => have_sps = true,
                    Some(NaluType::Pps) => have_pps = true,
                    Some(NaluType::Idr) => have_idr = true,
                    _ => {}
                }
            }
        }

        for i in (0..len).rev() {
            if keep[i] {
                continue;
            }
            let slot = match self.units[i].kind() {
                Some(NaluType::Sps) => &mut have_sps,
                Some(NaluType::Pps) => &mut have_pps,
                Some(NaluType::Idr) => &mut have_idr,
                _ => continue,
            };
            if !*slot {
                *slot = true;
                keep[i] = true;
            }
        }

        let mut index = 0;
        self.units.retain(|_| {
            let k = keep[index];
            index += 1;
            k
        });
        self.size = self.units.iter().map(NalUnit::len).sum();

        len - self.units.len()
    }

    /// Keep only the newest `n` units, ignoring priority
    pub fn truncate_to_latest(&mut self, n: usize) -> usize {
        let mut removed = 0;
        while self.units.len() > n {
            if let Some(old) = self.units.pop_front() {
                self.size -= old.len();
                removed += 1;
            }
        }
        removed
    }

    /// Newest unit of the given type
    pub fn latest(&self, kind: NaluType) -> Option<&NalUnit> {
        self.units.iter().rev().find(|u| u.kind() == Some(kind))
    }

    pub fn latest_sps(&self) -> Option<&NalUnit> {
        self.latest(NaluType::Sps)
    }

    pub fn latest_pps(&self) -> Option<&NalUnit> {
        self.latest(NaluType::Pps)
    }

    pub fn latest_idr(&self) -> Option<&NalUnit> {
        self.latest(NaluType::Idr)
    }

    pub fn has_keyframe(&self) -> bool {
        self.latest_idr().is_some()
    }

    /// Units in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &NalUnit> {
        self.units.iter()
    }

    /// Units to send a newly attached consumer, in order: SPS, PPS, latest
    /// IDR, then the remaining units in arrival order. Partitioned slices
    /// and units already listed are skipped.
    pub fn catchup_units(&self) -> Vec<NalUnit> {
        let mut picked: Vec<usize> = Vec::with_capacity(self.units.len());
        for kind in [NaluType::Sps, NaluType::Pps, NaluType::Idr] {
            if let Some(i) = self.units.iter().rposition(|u| u.kind() == Some(kind)) {
                picked.push(i);
            }
        }
        let head = picked.len();
        for (i, unit) in self.units.iter().enumerate() {
            if picked[..head].contains(&i) {
                continue;
            }
            if unit.kind().is_some_and(|k| k.is_partition()) {
                continue;
            }
            picked.push(i);
        }
        picked.into_iter().map(|i| self.units[i].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Buffered bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_units(&self) -> usize {
        self.max_units
    }

    /// When the last unit was pushed
    pub fn last_push(&self) -> Option<Instant> {
        self.last_push
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.size = 0;
        self.last_push = None;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio frame FIFO bounded by bytes
#[derive(Debug)]
pub struct AudioBuffer {
    frames: VecDeque<Bytes>,
    max_bytes: usize,
    size: usize,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_AUDIO_BYTES)
    }

    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            max_bytes,
            size: 0,
        }
    }

    /// Append a frame, dropping the oldest frames past the byte ceiling.
    ///
    /// The newest frame is always kept. Returns the number dropped.
    pub fn push(&mut self, frame: Bytes) -> usize {
        self.size += frame.len();
        self.frames.push_back(frame);

        let mut dropped = 0;
        while self.size > self.max_bytes && self.frames.len() > 1 {
            if let Some(old) = self.frames.pop_front() {
                self.size -= old.len();
                dropped += 1;
            }
        }
        dropped
    }

    pub fn truncate_to_latest(&mut self, n: usize) -> usize {
        let mut removed = 0;
        while self.frames.len() > n {
            if let Some(old) = self.frames.pop_front() {
                self.size -= old.len();
                removed += 1;
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.size = 0;
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub video_units: usize,
    pub audio_frames: usize,
    pub video_assembly_bytes: usize,
    pub audio_assembly_bytes: usize,
}

impl CleanupOutcome {
    pub fn is_noop(&self) -> bool {
        *self == CleanupOutcome::default()
    }
}

/// Every buffer a session owns: parsed units, audio frames and the raw
/// assembly buffers that hold not-yet-terminated bytes
#[derive(Debug, Default)]
pub struct MediaBuffers {
    pub video: FrameBuffer,
    pub audio: AudioBuffer,
    pub video_assembly: BytesMut,
    pub audio_assembly: BytesMut,
    /// Start-code search position within `video_assembly`
    video_scan_from: usize,
}

impl MediaBuffers {
    pub fn new(max_video_units: usize, max_audio_bytes: usize) -> Self {
        Self {
            video: FrameBuffer::with_max_units(max_video_units),
            audio: AudioBuffer::with_max_bytes(max_audio_bytes),
            video_assembly: BytesMut::new(),
            audio_assembly: BytesMut::new(),
            video_scan_from: 0,
        }
    }

    /// Append a video chunk and take out every unit it completes
    pub fn assemble_video(&mut self, chunk: &[u8]) -> Vec<NalUnit> {
        self.video_assembly.extend_from_slice(chunk);
        drain_annex_b(&mut self.video_assembly, &mut self.video_scan_from)
    }

    /// Shrink buffers for a memory-pressure level.
    ///
    /// Buffers already within the level's limits are left untouched, so
    /// repeating a level is a no-op.
    pub fn apply_cleanup(&mut self, level: CleanupLevel) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();
        self.video_scan_from = 0;
        match level {
            CleanupLevel::Gentle => {
                let video_target = GENTLE_MIN_VIDEO_UNITS.max(sixty_percent(self.video.len()));
                outcome.video_units = self.video.retain_priority(video_target);
                let audio_target = GENTLE_MIN_AUDIO_FRAMES.max(sixty_percent(self.audio.len()));
                outcome.audio_frames = self.audio.truncate_to_latest(audio_target);

                outcome.video_assembly_bytes = keep_tail(
                    &mut self.video_assembly,
                    GENTLE_VIDEO_ASSEMBLY_LIMIT,
                    GENTLE_VIDEO_ASSEMBLY_KEEP,
                );
                outcome.audio_assembly_bytes = keep_tail(
                    &mut self.audio_assembly,
                    GENTLE_AUDIO_ASSEMBLY_LIMIT,
                    GENTLE_AUDIO_ASSEMBLY_KEEP,
                );
            }
            CleanupLevel::Aggressive => {
                outcome.video_units = self.video.retain_priority(AGGRESSIVE_VIDEO_UNITS);
                outcome.audio_frames = self.audio.truncate_to_latest(AGGRESSIVE_AUDIO_FRAMES);
                outcome.video_assembly_bytes =
                    keep_tail(&mut self.video_assembly, AGGRESSIVE_VIDEO_ASSEMBLY_LIMIT, 0);
                outcome.audio_assembly_bytes =
                    keep_tail(&mut self.audio_assembly, AGGRESSIVE_AUDIO_ASSEMBLY_LIMIT, 0);
            }
            CleanupLevel::Emergency => {
                outcome.video_units = self.video.truncate_to_latest(1);
                outcome.audio_frames = self.audio.truncate_to_latest(1);
                outcome.video_assembly_bytes = self.video_assembly.len();
                outcome.audio_assembly_bytes = self.audio_assembly.len();
                self.video_assembly.clear();
                self.audio_assembly.clear();
            }
        }
        outcome
    }

    /// Buffered bytes across all four buffers
    pub fn total_bytes(&self) -> usize {
        self.video.size() + self.audio.size() + self.video_assembly.len() + self.audio_assembly.len()
    }

    pub fn clear(&mut self) {
        self.video.clear();
        self.audio.clear();
        self.video_assembly.clear();
        self.audio_assembly.clear();
        self.video_scan_from = 0;
    }
}

fn sixty_percent(n: usize) -> usize {
    (n * 6 + 9) / 10
}

/// If `buf` exceeds `limit`, keep only its last `keep` bytes.
/// Returns the number of bytes dropped.
fn keep_tail(buf: &mut BytesMut, limit: usize, keep: usize) -> usize {
    if buf.len() <= limit {
        return 0;
    }
    let dropped = buf.len() - keep;
    let _ = buf.split_to(dropped);
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit(nal_type: u8, tag: u8) -> NalUnit {
        NalUnit::from_payload(&[nal_type, tag, 0xAA]).unwrap()
    }

    fn types(buffer: &FrameBuffer) -> Vec<u8> {
        buffer.iter().map(|u| u.nal_type).collect()
    }

    fn tags(buffer: &FrameBuffer) -> Vec<u8> {
        buffer.iter().map(|u| u.payload()[1]).collect()
    }

    #[test]
    fn test_push_under_ceiling_keeps_everything() {
        let mut buffer = FrameBuffer::with_max_units(5);
        for i in 0..5 {
            assert_eq!(buffer.push(unit(1, i)), 0);
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.size(), 5 * 7);
    }

    #[test]
    fn test_overflow_keeps_recent_and_parameter_sets() {
        let mut buffer = FrameBuffer::with_max_units(6);
        buffer.push(unit(7, 0));
        buffer.push(unit(8, 1));
        buffer.push(unit(5, 2));
        buffer.push(unit(1, 3));
        buffer.push(unit(1, 4));
        buffer.push(unit(1, 5));
        let evicted = buffer.push(unit(1, 6));

        assert_eq!(evicted, 1);
        assert_eq!(tags(&buffer), vec![0, 1, 2, 4, 5, 6]);
        assert_eq!(types(&buffer), vec![7, 8, 5, 1, 1, 1]);
    }

    #[test]
    fn test_priority_walk_prefers_newest_idr() {
        let mut buffer = FrameBuffer::with_max_units(100);
        buffer.push(unit(5, 0));
        buffer.push(unit(1, 1));
        buffer.push(unit(5, 2));
        for i in 3..8 {
            buffer.push(unit(1, i));
        }
        buffer.retain_priority(3);
        assert_eq!(tags(&buffer), vec![2, 5, 6, 7]);
    }

    #[test]
    fn test_priority_walk_skips_extras_in_recent_window() {
        let mut buffer = FrameBuffer::with_max_units(100);
        buffer.push(unit(7, 0));
        buffer.push(unit(1, 1));
        buffer.push(unit(7, 2));
        buffer.push(unit(5, 3));
        buffer.push(unit(1, 4));
        buffer.retain_priority(3);
        // newest SPS already in the recent window, the older one goes
        assert_eq!(tags(&buffer), vec![2, 3, 4]);
    }

    #[test]
    fn test_catchup_order() {
        let mut buffer = FrameBuffer::with_max_units(100);
        buffer.push(unit(6, 0));
        buffer.push(unit(7, 1));
        buffer.push(unit(8, 2));
        buffer.push(unit(5, 3));
        buffer.push(unit(2, 4));
        buffer.push(unit(1, 5));

        let catchup: Vec<u8> = buffer.catchup_units().iter().map(|u| u.payload()[1]).collect();
        assert_eq!(catchup, vec![1, 2, 3, 0, 5]);
    }

    #[test]
    fn test_catchup_without_parameter_sets() {
        let mut buffer = FrameBuffer::with_max_units(100);
        buffer.push(unit(1, 0));
        buffer.push(unit(1, 1));
        assert_eq!(buffer.catchup_units().len(), 2);
        assert!(!buffer.has_keyframe());
    }

    #[test]
    fn test_truncate_to_latest() {
        let mut buffer = FrameBuffer::with_max_units(100);
        buffer.push(unit(7, 0));
        buffer.push(unit(5, 1));
        buffer.push(unit(1, 2));
        assert_eq!(buffer.truncate_to_latest(1), 2);
        assert_eq!(tags(&buffer), vec![2]);
        assert_eq!(buffer.size(), 7);
    }

    #[test]
    fn test_audio_buffer_byte_ceiling() {
        let mut audio = AudioBuffer::with_max_bytes(10);
        assert_eq!(audio.push(Bytes::from_static(&[0; 4])), 0);
        assert_eq!(audio.push(Bytes::from_static(&[0; 4])), 0);
        assert_eq!(audio.push(Bytes::from_static(&[0; 4])), 1);
        assert_eq!(audio.len(), 2);
        assert_eq!(audio.size(), 8);

        // oversized frame still kept on its own
        audio.push(Bytes::from(vec![0; 20]));
        assert_eq!(audio.len(), 1);
    }

    fn filled(video_units: u8, audio_frames: usize) -> MediaBuffers {
        let mut buffers = MediaBuffers::new(100, DEFAULT_MAX_AUDIO_BYTES);
        buffers.video.push(unit(7, 0));
        buffers.video.push(unit(8, 1));
        buffers.video.push(unit(5, 2));
        for i in 3..video_units {
            buffers.video.push(unit(1, i));
        }
        for _ in 0..audio_frames {
            buffers.audio.push(Bytes::from_static(&[0x21; 16]));
        }
        buffers
    }

    #[test]
    fn test_gentle_cleanup() {
        let mut buffers = filled(20, 10);
        buffers.video_assembly.extend_from_slice(&vec![0u8; 600 * KB]);
        buffers.audio_assembly.extend_from_slice(&vec![0u8; 100 * KB]);

        let outcome = buffers.apply_cleanup(CleanupLevel::Gentle);
        // 12 recent + SPS/PPS/IDR
        assert_eq!(buffers.video.len(), 15);
        assert_eq!(buffers.audio.len(), 6);
        assert_eq!(buffers.video_assembly.len(), 256 * KB);
        assert_eq!(buffers.audio_assembly.len(), 100 * KB);
        assert_eq!(outcome.video_units, 5);
        assert_eq!(outcome.audio_frames, 4);
    }

    #[test]
    fn test_aggressive_cleanup() {
        let mut buffers = filled(20, 10);
        buffers.video_assembly.extend_from_slice(&vec![0u8; 2 * MB]);
        buffers.audio_assembly.extend_from_slice(&vec![0u8; 100 * KB]);

        buffers.apply_cleanup(CleanupLevel::Aggressive);
        assert_eq!(types(&buffers.video), vec![7, 8, 5, 1, 1, 1]);
        assert_eq!(buffers.audio.len(), 2);
        assert!(buffers.video_assembly.is_empty());
        assert_eq!(buffers.audio_assembly.len(), 100 * KB);
    }

    #[test]
    fn test_emergency_cleanup() {
        let mut buffers = filled(20, 10);
        buffers.video_assembly.extend_from_slice(&[0, 0, 0, 1, 0x41]);
        buffers.audio_assembly.extend_from_slice(&[0xFF, 0xF1]);

        let outcome = buffers.apply_cleanup(CleanupLevel::Emergency);
        assert_eq!(buffers.video.len(), 1);
        assert_eq!(buffers.video.iter().next().unwrap().payload()[1], 19);
        assert_eq!(buffers.audio.len(), 1);
        assert!(buffers.video_assembly.is_empty());
        assert!(buffers.audio_assembly.is_empty());
        assert_eq!(outcome.video_assembly_bytes, 5);
    }

    #[test]
    fn test_assemble_video_keeps_pending_tail() {
        let mut buffers = MediaBuffers::new(100, DEFAULT_MAX_AUDIO_BYTES);
        assert!(buffers.assemble_video(&[0, 0, 0, 1, 0x65, 0x88]).is_empty());
        assert!(buffers.assemble_video(&[0x84, 0x00]).is_empty());

        let units = buffers.assemble_video(&[0x00, 0x00, 0x01, 0x41, 0x9A]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].payload(), &[0x65, 0x88, 0x84]);
        assert_eq!(&buffers.video_assembly[..], &[0, 0, 0, 1, 0x41, 0x9A]);
    }

    #[test]
    fn test_assemble_video_after_gentle_trim() {
        let mut buffers = MediaBuffers::new(100, DEFAULT_MAX_AUDIO_BYTES);
        let mut big = vec![0, 0, 0, 1, 0x65];
        big.resize(600 * KB, 0x55);
        assert!(buffers.assemble_video(&big).is_empty());

        // The trimmed tail no longer starts at a start code
        buffers.apply_cleanup(CleanupLevel::Gentle);
        assert_eq!(buffers.video_assembly.len(), 256 * KB);

        let units = buffers.assemble_video(&[0, 0, 0, 1, 0x41, 0x9A, 0, 0, 0, 1]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nal_type, 1);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        for level in [CleanupLevel::Aggressive, CleanupLevel::Emergency] {
            let mut buffers = filled(20, 10);
            buffers.apply_cleanup(level);
            let before: Vec<NalUnit> = buffers.video.iter().cloned().collect();
            let outcome = buffers.apply_cleanup(level);
            assert!(outcome.is_noop(), "{:?} not idempotent", level);
            assert_eq!(buffers.video.iter().cloned().collect::<Vec<_>>(), before);
        }

        let mut small = filled(3, 2);
        assert!(small.apply_cleanup(CleanupLevel::Gentle).is_noop());
    }

    proptest! {
        #[test]
        fn prop_overflow_retains_recent_and_priority(
            kinds in prop::collection::vec(prop::sample::select(vec![1u8, 1, 1, 5, 6, 7, 8]), 1..60),
            ceiling in 3usize..20,
        ) {
            let mut buffer = FrameBuffer::with_max_units(ceiling);
            let mut pushed = Vec::new();
            for (i, kind) in kinds.iter().enumerate() {
                let u = NalUnit::from_payload(&[*kind, (i % 256) as u8, (i / 256) as u8]).unwrap();
                pushed.push(u.clone());
                buffer.push(u);
            }

            let kept: Vec<NalUnit> = buffer.iter().cloned().collect();
            let recent = pushed.len().min(KEEP_RECENT_UNITS);
            prop_assert_eq!(&kept[kept.len() - recent..], &pushed[pushed.len() - recent..]);

            for kind in [NaluType::Sps, NaluType::Pps, NaluType::Idr] {
                if pushed.iter().any(|u| u.kind() == Some(kind)) {
                    prop_assert!(kept.iter().any(|u| u.kind() == Some(kind)));
                }
            }
            prop_assert!(buffer.len() <= ceiling.max(KEEP_RECENT_UNITS + 3));
        }
    }
}
