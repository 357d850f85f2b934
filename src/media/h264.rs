//! H.264 Annex-B parsing
//!
//! Cameras hand us an unframed elementary stream in Annex-B byte-stream
//! format: NAL units separated by start codes.
//!
//! ```text
//! +-------------+--------+-------------+--------+-----
//! | 00 00 00 01 | NAL    | 00 00 01    | NAL    | ...
//! +-------------+--------+-------------+--------+-----
//!
//! NAL header byte:
//! +---+-------+-----------+
//! | F | NRI   | Type      |
//! | 1 | 2 bits| 5 bits    |
//! +---+-------+-----------+
//! ```
//!
//! Event boundaries carry no meaning, so a unit is only complete once the
//! following start code has been seen. [`split_annex_b`] returns the complete
//! units and the unterminated tail of one buffer. [`drain_annex_b`] does the
//! same over a growing buffer, resuming its search where the previous call
//! stopped, so each byte is scanned a bounded number of times.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// 4-byte start code, preferred over the 3-byte form
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 3-byte start code
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// Smallest acceptable unit: start code plus at least one payload byte
pub const MIN_NAL_UNIT_LEN: usize = 5;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    /// Data-partitioned slices, which most consumers cannot decode
    pub fn is_partition(&self) -> bool {
        matches!(
            self,
            NaluType::SlicePartA | NaluType::SlicePartB | NaluType::SlicePartC
        )
    }
}

/// A single NAL unit as it appeared on the wire
///
/// `data` keeps the original start code so the unit can be forwarded to a
/// consumer byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// NAL type (0-31)
    pub nal_type: u8,
    /// Start code followed by the payload
    pub data: Bytes,
    /// Width of the leading start code (3 or 4)
    pub start_code_len: usize,
}

impl NalUnit {
    /// Build a unit from raw Annex-B bytes that begin with a start code
    pub fn from_annex_b(data: Bytes) -> Option<Self> {
        let start_code_len = if data.starts_with(&START_CODE_4) {
            4
        } else if data.starts_with(&START_CODE_3) {
            3
        } else {
            return None;
        };
        let header = *data.get(start_code_len)?;
        Some(Self {
            nal_type: header & 0x1F,
            data,
            start_code_len,
        })
    }

    /// Build a unit from a bare payload, prefixing a 4-byte start code
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let mut data = Vec::with_capacity(4 + payload.len());
        data.extend_from_slice(&START_CODE_4);
        data.extend_from_slice(payload);
        Self::from_annex_b(Bytes::from(data))
    }

    /// Payload without the start code (header byte first)
    pub fn payload(&self) -> &[u8] {
        &self.data[self.start_code_len..]
    }

    /// Typed view of `nal_type`
    pub fn kind(&self) -> Option<NaluType> {
        NaluType::from_byte(self.nal_type)
    }

    /// Total wire size including the start code
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_sps(&self) -> bool {
        self.kind() == Some(NaluType::Sps)
    }

    pub fn is_pps(&self) -> bool {
        self.kind() == Some(NaluType::Pps)
    }

    pub fn is_idr(&self) -> bool {
        self.kind() == Some(NaluType::Idr)
    }
}

/// Output of [`split_annex_b`]
#[derive(Debug, Clone, Default)]
pub struct AnnexBSplit {
    /// Complete units, in stream order
    pub units: Vec<NalUnit>,
    /// Unterminated tail, starting at its start code (or the whole input
    /// when it contains no start code)
    pub remainder: Bytes,
    /// Leading bytes before the first start code that were thrown away
    pub discarded: usize,
}

/// Locate the next start code at or after `from`.
///
/// Returns `(position, width)`. At each position the 4-byte form is tested
/// before the 3-byte one.
pub fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] != 0 {
            i += 1;
            continue;
        }
        if i + 4 <= data.len() && data[i..i + 4] == START_CODE_4 {
            return Some((i, 4));
        }
        if data[i..i + 3] == START_CODE_3 {
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// Split an accumulated Annex-B buffer into complete NAL units.
///
/// A unit spans from one start code to the next. The last unit has no
/// closing start code yet and comes back as the remainder. Units shorter
/// than [`MIN_NAL_UNIT_LEN`] are dropped. When the buffer holds no start
/// code at all, nothing is consumed.
pub fn split_annex_b(data: Bytes) -> AnnexBSplit {
    let Some((first, _)) = find_start_code(&data, 0) else {
        return AnnexBSplit {
            units: Vec::new(),
            remainder: data,
            discarded: 0,
        };
    };

    let mut pending = BytesMut::from(&data[first..]);
    let mut scan_from = 0;
    let units = drain_annex_b(&mut pending, &mut scan_from);

    AnnexBSplit {
        units,
        remainder: pending.freeze(),
        discarded: first,
    }
}

/// Pull every complete unit off the front of a growing Annex-B buffer.
///
/// `buf` keeps the unterminated tail. `scan_from` records how far the
/// search for the next start code got, and must be reset to 0 whenever
/// `buf` is modified by anything other than this function. Bytes before the
/// first start code are discarded; without any start code only a possible
/// partial start code is kept.
///
/// Emitted units own their bytes, so a buffered unit never holds on to the
/// assembly allocation.
pub fn drain_annex_b(buf: &mut BytesMut, scan_from: &mut usize) -> Vec<NalUnit> {
    let mut units = Vec::new();

    let mut head_len = match start_code_len_at(buf) {
        Some(len) => len,
        None => match find_start_code(buf, 0) {
            Some((pos, len)) => {
                tracing::trace!(bytes = pos, "Discarding bytes before first start code");
                buf.advance(pos);
                *scan_from = 0;
                len
            }
            None => {
                let keep = buf.len().min(START_CODE_3.len());
                let discarded = buf.len() - keep;
                if discarded > 0 {
                    tracing::trace!(bytes = discarded, "Discarding bytes with no start code");
                    buf.advance(discarded);
                }
                *scan_from = 0;
                return units;
            }
        },
    };

    loop {
        match find_start_code(buf, (*scan_from).max(head_len)) {
            Some((next, next_len)) => {
                let raw = Bytes::copy_from_slice(&buf[..next]);
                buf.advance(next);
                *scan_from = 0;
                head_len = next_len;

                if raw.len() < MIN_NAL_UNIT_LEN {
                    tracing::trace!(len = raw.len(), "Dropping undersized NAL unit");
                    continue;
                }
                if let Some(unit) = NalUnit::from_annex_b(raw) {
                    units.push(unit);
                }
            }
            None => {
                // The last few positions were only partly tested
                *scan_from = buf.len().saturating_sub(START_CODE_3.len());
                return units;
            }
        }
    }
}

fn start_code_len_at(data: &[u8]) -> Option<usize> {
    if data.starts_with(&START_CODE_4) {
        Some(4)
    } else if data.starts_with(&START_CODE_3) {
        Some(3)
    } else {
        None
    }
}

/// Fields of a sequence parameter set needed to describe the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    /// Display width in pixels, after cropping
    pub width: u32,
    /// Display height in pixels, after cropping
    pub height: u32,
}

impl SpsInfo {
    /// Parse an SPS payload (NAL header byte first, start code stripped)
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(MediaError::InvalidSps("too short").into());
        }
        if NaluType::from_byte(payload[0]) != Some(NaluType::Sps) {
            return Err(MediaError::InvalidSps("not an SPS").into());
        }

        let rbsp = strip_emulation_prevention(&payload[1..]);
        let mut r = BitReader::new(&rbsp);

        let profile_idc = r.read_bits(8)? as u8;
        let constraint_flags = r.read_bits(8)? as u8;
        let level_idc = r.read_bits(8)? as u8;
        r.read_ue()?; // seq_parameter_set_id

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane = false;
        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_bit()?;
            }
            r.read_ue()?; // bit_depth_luma_minus8
            r.read_ue()?; // bit_depth_chroma_minus8
            r.read_bit()?; // qpprime_y_zero_transform_bypass_flag
            if r.read_bit()? {
                let lists = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..lists {
                    if r.read_bit()? {
                        r.skip_scaling_list(if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.read_ue()?; // log2_max_frame_num_minus4
        match r.read_ue()? {
            0 => {
                r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.read_bit()?; // delta_pic_order_always_zero_flag
                r.read_se()?; // offset_for_non_ref_pic
                r.read_se()?; // offset_for_top_to_bottom_field
                let cycle = r.read_ue()?;
                for _ in 0..cycle {
                    r.read_se()?;
                }
            }
            _ => {}
        }
        r.read_ue()?; // max_num_ref_frames
        r.read_bit()?; // gaps_in_frame_num_value_allowed_flag

        let width_mbs = r.read_ue()? + 1;
        let height_map_units = r.read_ue()? + 1;
        let frame_mbs_only = r.read_bit()?;
        if !frame_mbs_only {
            r.read_bit()?; // mb_adaptive_frame_field_flag
        }
        r.read_bit()?; // direct_8x8_inference_flag

        let field_factor = if frame_mbs_only { 1 } else { 2 };
        let mut width = width_mbs * 16;
        let mut height = height_map_units * 16 * field_factor;

        if r.read_bit()? {
            let left = r.read_ue()?;
            let right = r.read_ue()?;
            let top = r.read_ue()?;
            let bottom = r.read_ue()?;

            let chroma_array_type = if separate_colour_plane {
                0
            } else {
                chroma_format_idc
            };
            let (crop_x, crop_y) = if chroma_array_type == 0 {
                (1, field_factor)
            } else {
                let sub_width = if chroma_format_idc == 3 { 1 } else { 2 };
                let sub_height = if chroma_format_idc == 1 { 2 } else { 1 };
                (sub_width, sub_height * field_factor)
            };

            width = width
                .checked_sub(crop_x * (left + right))
                .ok_or(MediaError::InvalidSps("horizontal crop exceeds width"))?;
            height = height
                .checked_sub(crop_y * (top + bottom))
                .ok_or(MediaError::InvalidSps("vertical crop exceeds height"))?;
        }

        if width == 0 || height == 0 {
            return Err(MediaError::InvalidSps("zero dimensions").into());
        }

        Ok(SpsInfo {
            profile_idc,
            constraint_flags,
            level_idc,
            width,
            height,
        })
    }
}

/// Remove emulation-prevention bytes (`00 00 03` becomes `00 00`)
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// MSB-first bit reader with Exp-Golomb support
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or(MediaError::InvalidSps("truncated"))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    fn read_bits(&mut self, n: u32) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u32;
        }
        Ok(v)
    }

    fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(MediaError::InvalidSps("exp-golomb overflow").into());
            }
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + suffix as u64) as u32)
    }

    fn read_se(&mut self) -> Result<i32> {
        let k = self.read_ue()? as i64;
        Ok(if k % 2 == 1 {
            ((k + 1) / 2) as i32
        } else {
            (-(k / 2)) as i32
        })
    }

    fn skip_scaling_list(&mut self, size: usize) -> Result<()> {
        let mut last = 8i32;
        let mut next = 8i32;
        for _ in 0..size {
            if next != 0 {
                let delta = self.read_se()?;
                next = (last + delta + 256) % 256;
            }
            if next != 0 {
                last = next;
            }
        }
        Ok(())
    }
}
