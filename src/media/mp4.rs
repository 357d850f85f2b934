//! Fragmented-MP4 initialization segment
//!
//! A consumer reading the relay socket first gets `ftyp` + `moov`, enough to
//! set up its decoders, and then the raw Annex-B units. Sample tables are
//! empty because no samples are ever described here.
//!
//! ```text
//! ftyp
//! moov
//!   mvhd
//!   trak (video)                      trak (audio, optional)
//!     tkhd                              tkhd
//!     mdia                              mdia
//!       mdhd, hdlr(vide)                  mdhd, hdlr(soun)
//!       minf                              minf
//!         vmhd, dinf                        smhd, dinf
//!         stbl                              stbl
//!           stsd > avc1 > avcC                stsd > mp4a > esds
//!           stts stsc stsz stco               stts stsc stsz stco
//!   mvex
//!     trex (per track)
//! ```
//!
//! All integers are big-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};
use crate::media::aac::AudioSpecificConfig;

/// Video media timescale (90 kHz)
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Movie timescale (milliseconds)
pub const MOVIE_TIMESCALE: u32 = 1_000;

const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Length-prefixed box writer.
///
/// Each box reserves its 4-byte size, writes its body through a closure and
/// patches the size once the closure returns, so nesting never needs manual
/// offset arithmetic.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: BytesMut,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a plain box
    pub fn write_box<F>(&mut self, fourcc: &[u8; 4], body: F) -> &mut Self
    where
        F: FnOnce(&mut BoxWriter),
    {
        let start = self.buf.len();
        self.buf.put_u32(0);
        self.buf.put_slice(fourcc);
        body(self);
        let size = (self.buf.len() - start) as u32;
        self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        self
    }

    /// Write a full box (version + 24-bit flags header)
    pub fn write_full_box<F>(&mut self, fourcc: &[u8; 4], version: u8, flags: u32, body: F) -> &mut Self
    where
        F: FnOnce(&mut BoxWriter),
    {
        self.write_box(fourcc, |w| {
            w.u8(version).u24(flags);
            body(w);
        })
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16(v);
        self
    }

    pub fn u24(&mut self, v: u32) -> &mut Self {
        self.buf.put_uint(u64::from(v & 0x00FF_FFFF), 3);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_slice(v);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.put_bytes(0, n);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Codec configuration for the video track
#[derive(Debug, Clone)]
pub struct VideoTrackConfig {
    /// SPS payload (NAL header first, no start code)
    pub sps: Bytes,
    /// PPS payload (NAL header first, no start code)
    pub pps: Bytes,
    pub width: u32,
    pub height: u32,
}

impl VideoTrackConfig {
    fn validate(&self) -> Result<()> {
        if self.sps.is_empty() {
            return Err(MediaError::MissingParameterSet("SPS").into());
        }
        if self.pps.is_empty() {
            return Err(MediaError::MissingParameterSet("PPS").into());
        }
        if self.sps.len() < 4 {
            return Err(MediaError::InvalidSps("too short for avcC").into());
        }
        // avcC stores each parameter set length in 16 bits
        for (kind, set) in [("SPS", &self.sps), ("PPS", &self.pps)] {
            if set.len() > usize::from(u16::MAX) {
                return Err(MediaError::ParameterSetTooLong {
                    kind,
                    len: set.len(),
                }
                .into());
            }
        }
        if self.width == 0
            || self.height == 0
            || self.width > u32::from(u16::MAX)
            || self.height > u32::from(u16::MAX)
        {
            return Err(MediaError::InvalidDimensions {
                width: self.width,
                height: self.height,
            }
            .into());
        }
        Ok(())
    }
}

/// Build `ftyp` + `moov` for one video track and an optional AAC track.
///
/// Fails rather than guessing: missing parameter sets or unknown geometry
/// are errors, and the caller falls back to a bare Annex-B stream.
pub fn build_init_segment(
    video: &VideoTrackConfig,
    audio: Option<&AudioSpecificConfig>,
) -> Result<Bytes> {
    video.validate()?;

    let mut w = BoxWriter::new();
    write_ftyp(&mut w);
    w.write_box(b"moov", |w| {
        let next_track_id = if audio.is_some() { 3 } else { 2 };
        write_mvhd(w, next_track_id);
        write_video_trak(w, video);
        if let Some(asc) = audio {
            write_audio_trak(w, asc);
        }
        w.write_box(b"mvex", |w| {
            write_trex(w, VIDEO_TRACK_ID);
            if audio.is_some() {
                write_trex(w, AUDIO_TRACK_ID);
            }
        });
    });

    Ok(w.finish())
}

fn write_ftyp(w: &mut BoxWriter) {
    w.write_box(b"ftyp", |w| {
        w.bytes(b"isom").u32(0x200);
        for brand in [b"isom", b"iso2", b"iso6", b"avc1", b"mp41"] {
            w.bytes(brand);
        }
    });
}

fn write_trex(w: &mut BoxWriter, track_id: u32) {
    w.write_full_box(b"trex", 0, 0, |w| {
        w.u32(track_id)
            .u32(1) // default sample description index
            .u32(0) // default sample duration
            .u32(0) // default sample size
            .u32(0); // default sample flags
    });
}

fn write_matrix(w: &mut BoxWriter) {
    for m in UNITY_MATRIX {
        w.u32(m);
    }
}

fn write_mvhd(w: &mut BoxWriter, next_track_id: u32) {
    w.write_full_box(b"mvhd", 0, 0, |w| {
        w.u32(0) // creation time
            .u32(0) // modification time
            .u32(MOVIE_TIMESCALE)
            .u32(0) // duration (live)
            .u32(0x0001_0000) // rate 1.0
            .u16(0x0100) // volume 1.0
            .zeros(10);
        write_matrix(w);
        w.zeros(24).u32(next_track_id);
    });
}

fn write_tkhd(w: &mut BoxWriter, track_id: u32, volume: u16, width: u32, height: u32) {
    // flags: enabled | in movie
    w.write_full_box(b"tkhd", 0, 0x000003, |w| {
        w.u32(0)
            .u32(0)
            .u32(track_id)
            .u32(0) // reserved
            .u32(0) // duration
            .zeros(8)
            .i16(0) // layer
            .i16(0) // alternate group
            .u16(volume)
            .u16(0);
        write_matrix(w);
        w.u32(width << 16).u32(height << 16);
    });
}

fn write_mdhd(w: &mut BoxWriter, timescale: u32) {
    w.write_full_box(b"mdhd", 0, 0, |w| {
        w.u32(0).u32(0).u32(timescale).u32(0);
        w.u16(0x55C4).u16(0); // language "und"
    });
}

fn write_hdlr(w: &mut BoxWriter, handler: &[u8; 4], name: &[u8]) {
    w.write_full_box(b"hdlr", 0, 0, |w| {
        w.u32(0).bytes(handler).zeros(12).bytes(name).u8(0);
    });
}

fn write_dinf(w: &mut BoxWriter) {
    w.write_box(b"dinf", |w| {
        w.write_full_box(b"dref", 0, 0, |w| {
            w.u32(1);
            // self-contained
            w.write_full_box(b"url ", 0, 1, |_| {});
        });
    });
}

fn write_empty_sample_tables(w: &mut BoxWriter) {
    w.write_full_box(b"stts", 0, 0, |w| {
        w.u32(0);
    });
    w.write_full_box(b"stsc", 0, 0, |w| {
        w.u32(0);
    });
    w.write_full_box(b"stsz", 0, 0, |w| {
        w.u32(0).u32(0);
    });
    w.write_full_box(b"stco", 0, 0, |w| {
        w.u32(0);
    });
}

fn write_video_trak(w: &mut BoxWriter, video: &VideoTrackConfig) {
    w.write_box(b"trak", |w| {
        write_tkhd(w, VIDEO_TRACK_ID, 0, video.width, video.height);
        w.write_box(b"mdia", |w| {
            write_mdhd(w, VIDEO_TIMESCALE);
            write_hdlr(w, b"vide", b"VideoHandler");
            w.write_box(b"minf", |w| {
                w.write_full_box(b"vmhd", 0, 1, |w| {
                    w.u16(0).zeros(6);
                });
                write_dinf(w);
                w.write_box(b"stbl", |w| {
                    w.write_full_box(b"stsd", 0, 0, |w| {
                        w.u32(1);
                        write_avc1(w, video);
                    });
                    write_empty_sample_tables(w);
                });
            });
        });
    });
}

fn write_avc1(w: &mut BoxWriter, video: &VideoTrackConfig) {
    w.write_box(b"avc1", |w| {
        w.zeros(6)
            .u16(1) // data reference index
            .u16(0)
            .u16(0)
            .zeros(12)
            .u16(video.width as u16)
            .u16(video.height as u16)
            .u32(0x0048_0000) // 72 dpi
            .u32(0x0048_0000)
            .u32(0)
            .u16(1); // frame count

        let mut compressor = [0u8; 32];
        let name = b"camstream";
        compressor[0] = name.len() as u8;
        compressor[1..=name.len()].copy_from_slice(name);
        w.bytes(&compressor).u16(0x0018).i16(-1);

        w.write_box(b"avcC", |w| {
            w.u8(1) // configuration version
                .u8(video.sps[1]) // profile
                .u8(video.sps[2]) // compatibility
                .u8(video.sps[3]) // level
                .u8(0xFF) // 4-byte lengths
                .u8(0xE1) // one SPS
                .u16(video.sps.len() as u16)
                .bytes(&video.sps)
                .u8(1) // one PPS
                .u16(video.pps.len() as u16)
                .bytes(&video.pps);
        });
    });
}

fn write_audio_trak(w: &mut BoxWriter, asc: &AudioSpecificConfig) {
    w.write_box(b"trak", |w| {
        write_tkhd(w, AUDIO_TRACK_ID, 0x0100, 0, 0);
        w.write_box(b"mdia", |w| {
            write_mdhd(w, asc.sampling_frequency);
            write_hdlr(w, b"soun", b"SoundHandler");
            w.write_box(b"minf", |w| {
                w.write_full_box(b"smhd", 0, 0, |w| {
                    w.i16(0).u16(0);
                });
                write_dinf(w);
                w.write_box(b"stbl", |w| {
                    w.write_full_box(b"stsd", 0, 0, |w| {
                        w.u32(1);
                        write_mp4a(w, asc);
                    });
                    write_empty_sample_tables(w);
                });
            });
        });
    });
}

fn write_mp4a(w: &mut BoxWriter, asc: &AudioSpecificConfig) {
    let rate = if asc.sampling_frequency <= 0xFFFF {
        asc.sampling_frequency << 16
    } else {
        0
    };
    w.write_box(b"mp4a", |w| {
        w.zeros(6)
            .u16(1)
            .zeros(8)
            .u16(u16::from(asc.channels()))
            .u16(16) // sample size
            .u16(0)
            .u16(0)
            .u32(rate);
        write_esds(w, asc);
    });
}

/// MPEG-4 descriptor: tag, size, body
fn descriptor(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(tag);
    let len = body.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.extend_from_slice(&[
            0x80 | ((len >> 21) & 0x7F) as u8,
            0x80 | ((len >> 14) & 0x7F) as u8,
            0x80 | ((len >> 7) & 0x7F) as u8,
            (len & 0x7F) as u8,
        ]);
    }
    out.extend_from_slice(body);
    out
}

fn write_esds(w: &mut BoxWriter, asc: &AudioSpecificConfig) {
    let specific = descriptor(0x05, &asc.to_bytes());

    let mut config = vec![
        0x40, // MPEG-4 audio
        0x15, // audio stream
        0, 0, 0, // buffer size
        0, 0, 0, 0, // max bitrate
        0, 0, 0, 0, // avg bitrate
    ];
    config.extend_from_slice(&specific);
    let config = descriptor(0x04, &config);

    let mut es = Vec::new();
    es.extend_from_slice(&(AUDIO_TRACK_ID as u16).to_be_bytes());
    es.push(0); // flags
    es.extend_from_slice(&config);
    es.extend_from_slice(&descriptor(0x06, &[0x02]));

    w.write_full_box(b"esds", 0, 0, |w| {
        w.bytes(&descriptor(0x03, &es));
    });
}
