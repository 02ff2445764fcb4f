//! Metadata records carried as block payloads.
//!
//! Each record is a fixed-then-variable-length structure.  Inside a container
//! every field is big-endian; [`AudioMetadata`] can additionally be written
//! little-endian, which yields a playable RIFF/WAVE header.
//!
//! ## GlobalMetadata payload
//! | Field | Encoding |
//! |-------|----------|
//! | content id | 16 raw bytes |
//! | codec name | quick string, 8 bytes |
//! | major, minor | u16, u16 |
//! | frame count | u32 |
//! | audio block count | u32 |
//! | duration (ms) | u64 |
//! | title, copyright | length-prefixed strings (empty = absent) |
//! | timestamp (Unix ms) | u64 |
//!
//! ## FrameMetadata payload
//! format (quick string, 4 bytes), height u16, width u16, quality u8, rate u8.
//!
//! ## AudioMetadata payload
//! The canonical WAV header: `RIFF`, size, `WAVE`, `fmt `, format size,
//! compression, channels, sample rate, byte rate, block align, bit depth,
//! [extra size u16 + extra bytes when format size >= 18], `data`, data size.

use std::fmt;
use std::io::{Cursor, Read, Seek, Write};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::block::BlockType;
use crate::error::{MiwaError, Result};
use crate::stream::{ByteOrder, ContentReader, ContentWriter};

pub const CODEC_NAME:     &str  = "MIWA";
/// Declared quick-string length of the codec name.
pub const CODEC_NAME_LEN: usize = 8;
/// Declared quick-string length of format tags and RIFF chunk ids.
pub const TAG_LEN:        usize = 4;
pub const JPEG_FORMAT:    &str  = "JPEG";

pub const MAX_QUALITY:    u8 = 100;
pub const MIN_FRAME_RATE: u8 = 8;
pub const MAX_FRAME_RATE: u8 = 60;

pub const RIFF_ID:   &str = "RIFF";
pub const WAVE_ID:   &str = "WAVE";
pub const FORMAT_ID: &str = "fmt ";
pub const DATA_ID:   &str = "data";

/// Format chunk size of a plain PCM header (no extension bytes).
pub const PCM_FORMAT_SIZE: u32 = 16;
/// Format chunk size from which an extra-size field follows.
pub const EXTENDED_FORMAT_SIZE: u32 = 18;

// ── Codec identity ───────────────────────────────────────────────────────────

/// Major/minor packed into one comparable word: `major << 16 | minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimpleVersion(u32);

impl SimpleVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self(packed)
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub const fn packed(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SimpleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl Serialize for SimpleVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Version written by this build.  Containers with a newer major are refused.
pub const CURRENT_VERSION: SimpleVersion = SimpleVersion::new(1, 0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecInfo {
    pub name:    String,
    pub version: SimpleVersion,
}

impl CodecInfo {
    pub fn new(name: impl Into<String>, version: SimpleVersion) -> Self {
        Self { name: name.into(), version }
    }

    /// The identity of this implementation.
    pub fn miwa() -> Self {
        Self::new(CODEC_NAME, CURRENT_VERSION)
    }

    /// Whether a container produced by `self` can be decoded by this build.
    pub fn is_supported(&self) -> bool {
        self.name == CODEC_NAME && self.version.major() <= CURRENT_VERSION.major()
    }
}

impl fmt::Display for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

// ── GlobalMetadata ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalMetadata {
    pub content_id:        Uuid,
    pub codec:             CodecInfo,
    pub frame_count:       u32,
    pub audio_block_count: u32,
    pub duration_ms:       u64,
    /// Empty strings are stored as absent.
    pub title:             Option<String>,
    pub copyright:         Option<String>,
    /// Creation time, Unix epoch milliseconds.
    pub timestamp_ms:      u64,
}

impl GlobalMetadata {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.timestamp_ms).ok()?)
    }

    pub fn write<W: Write>(&self, w: &mut ContentWriter<W>, order: ByteOrder) -> Result<()> {
        w.write_bytes(self.content_id.as_bytes())?;
        w.write_quick_string(&self.codec.name, CODEC_NAME_LEN)?;
        w.write_u16(self.codec.version.major(), order)?;
        w.write_u16(self.codec.version.minor(), order)?;
        w.write_u32(self.frame_count, order)?;
        w.write_u32(self.audio_block_count, order)?;
        w.write_u64(self.duration_ms, order)?;
        w.write_string(self.title.as_deref().unwrap_or(""), order)?;
        w.write_string(self.copyright.as_deref().unwrap_or(""), order)?;
        w.write_u64(self.timestamp_ms, order)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut ContentReader<R>, order: ByteOrder) -> Result<Self> {
        let mut id = [0u8; 16];
        r.read_into(&mut id)?;
        let name = r.read_quick_string(CODEC_NAME_LEN)?;
        let major = r.read_u16(order)?;
        let minor = r.read_u16(order)?;
        Ok(Self {
            content_id:        Uuid::from_bytes(id),
            codec:             CodecInfo::new(name, SimpleVersion::new(major, minor)),
            frame_count:       r.read_u32(order)?,
            audio_block_count: r.read_u32(order)?,
            duration_ms:       r.read_u64(order)?,
            title:             non_empty(r.read_string(order)?),
            copyright:         non_empty(r.read_string(order)?),
            timestamp_ms:      r.read_u64(order)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_payload(|w| self.write(w, ByteOrder::BigEndian))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut ContentReader::new(bytes), ByteOrder::BigEndian)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// ── FrameMetadata ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameMetadata {
    /// Encoding tag of every frame payload, at most 4 ASCII characters.
    pub format:     String,
    pub height:     u16,
    pub width:      u16,
    /// 0–100.
    pub quality:    u8,
    /// Frames per track, 8–60.
    pub frame_rate: u8,
}

impl FrameMetadata {
    pub fn jpeg(width: u16, height: u16, quality: u8, frame_rate: u8) -> Self {
        Self { format: JPEG_FORMAT.to_owned(), height, width, quality, frame_rate }
    }

    /// Reject values a decoder cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.quality > MAX_QUALITY {
            return Err(MiwaError::invalid(format!("frame quality {} exceeds 100", self.quality)));
        }
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(MiwaError::invalid(format!(
                "frame rate {} outside {MIN_FRAME_RATE}..={MAX_FRAME_RATE}", self.frame_rate
            )));
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, w: &mut ContentWriter<W>, order: ByteOrder) -> Result<()> {
        w.write_quick_string(&self.format, TAG_LEN)?;
        w.write_u16(self.height, order)?;
        w.write_u16(self.width, order)?;
        w.write_u8(self.quality)?;
        w.write_u8(self.frame_rate)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut ContentReader<R>, order: ByteOrder) -> Result<Self> {
        Ok(Self {
            format:     r.read_quick_string(TAG_LEN)?,
            height:     r.read_u16(order)?,
            width:      r.read_u16(order)?,
            quality:    r.read_u8()?,
            frame_rate: r.read_u8()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_payload(|w| self.write(w, ByteOrder::BigEndian))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut ContentReader::new(bytes), ByteOrder::BigEndian)
    }
}

// ── AudioMetadata ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioMetadata {
    pub chunk_id:        String,
    pub chunk_size:      u32,
    pub format:          String,
    pub format_chunk_id: String,
    pub format_size:     u32,
    /// 1 = PCM.
    pub compression:     u16,
    pub channels:        u16,
    pub sample_rate:     u32,
    pub byte_rate:       u32,
    pub block_align:     u16,
    pub bits_per_sample: u16,
    /// Extension bytes; present exactly when `format_size >= 18`.
    pub extra_format:    Option<Vec<u8>>,
    pub data_chunk_id:   String,
    pub data_size:       u32,
}

impl AudioMetadata {
    /// A canonical PCM header for `data_size` bytes of samples.
    pub fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16, data_size: u32) -> Self {
        // Header fields saturate at their width for out-of-range inputs.
        let block_align = channels.saturating_mul(bits_per_sample.div_ceil(8));
        Self {
            chunk_id:        RIFF_ID.to_owned(),
            chunk_size:      data_size.saturating_add(36),
            format:          WAVE_ID.to_owned(),
            format_chunk_id: FORMAT_ID.to_owned(),
            format_size:     PCM_FORMAT_SIZE,
            compression:     1,
            channels,
            sample_rate,
            byte_rate:       sample_rate.saturating_mul(block_align as u32),
            block_align,
            bits_per_sample,
            extra_format:    None,
            data_chunk_id:   DATA_ID.to_owned(),
            data_size,
        }
    }

    /// Check chunk ids and the fields an audio slicer depends on.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_id != RIFF_ID {
            return Err(MiwaError::invalid(format!("expected RIFF chunk id, found {:?}", self.chunk_id)));
        }
        if self.format != WAVE_ID {
            return Err(MiwaError::invalid(format!("expected WAVE format, found {:?}", self.format)));
        }
        if self.data_chunk_id != DATA_ID {
            return Err(MiwaError::invalid(format!(
                "expected data chunk id, found {:?}", self.data_chunk_id
            )));
        }
        if self.format_size < PCM_FORMAT_SIZE {
            return Err(MiwaError::invalid(format!("format chunk too small ({} bytes)", self.format_size)));
        }
        if self.block_align == 0 || self.byte_rate == 0 {
            return Err(MiwaError::invalid("audio format declares a zero byte rate or block align"));
        }
        Ok(())
    }

    /// Bytes of sample data covering one track (one second), aligned down
    /// to whole sample frames.
    pub fn block_size(&self) -> usize {
        let align = self.block_align.max(1) as usize;
        let per_second = self.byte_rate as usize;
        (per_second / align).max(1) * align
    }

    pub fn write<W: Write>(&self, w: &mut ContentWriter<W>, order: ByteOrder) -> Result<()> {
        w.write_quick_string(&self.chunk_id, TAG_LEN)?;
        w.write_u32(self.chunk_size, order)?;
        w.write_quick_string(&self.format, TAG_LEN)?;
        w.write_quick_string(&self.format_chunk_id, TAG_LEN)?;
        w.write_u32(self.format_size, order)?;
        self.write_format_fields(w, order)?;
        w.write_quick_string(&self.data_chunk_id, TAG_LEN)?;
        w.write_u32(self.data_size, order)?;
        Ok(())
    }

    fn write_format_fields<W: Write>(&self, w: &mut ContentWriter<W>, order: ByteOrder) -> Result<()> {
        w.write_u16(self.compression, order)?;
        w.write_u16(self.channels, order)?;
        w.write_u32(self.sample_rate, order)?;
        w.write_u32(self.byte_rate, order)?;
        w.write_u16(self.block_align, order)?;
        w.write_u16(self.bits_per_sample, order)?;
        if self.format_size >= EXTENDED_FORMAT_SIZE {
            let extra = self.extra_format.as_deref().unwrap_or(&[]);
            if extra.len() != (self.format_size - EXTENDED_FORMAT_SIZE) as usize {
                return Err(MiwaError::ArgumentInvalid(format!(
                    "format size {} does not match {} extension bytes",
                    self.format_size,
                    extra.len()
                )));
            }
            w.write_u16(extra.len() as u16, order)?;
            w.write_bytes(extra)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut ContentReader<R>, order: ByteOrder) -> Result<Self> {
        let chunk_id = r.read_quick_string(TAG_LEN)?;
        let chunk_size = r.read_u32(order)?;
        let format = r.read_quick_string(TAG_LEN)?;
        let format_chunk_id = r.read_quick_string(TAG_LEN)?;
        let format_size = r.read_u32(order)?;
        let mut meta = Self::read_format_fields(r, order, format_size)?;
        meta.chunk_id = chunk_id;
        meta.chunk_size = chunk_size;
        meta.format = format;
        meta.format_chunk_id = format_chunk_id;
        meta.data_chunk_id = r.read_quick_string(TAG_LEN)?;
        meta.data_size = r.read_u32(order)?;
        Ok(meta)
    }

    /// Parse the body of a `fmt ` chunk of `format_size` bytes.
    fn read_format_fields<R: Read>(
        r:           &mut ContentReader<R>,
        order:       ByteOrder,
        format_size: u32,
    ) -> Result<Self> {
        if format_size < PCM_FORMAT_SIZE {
            return Err(MiwaError::invalid(format!("format chunk too small ({format_size} bytes)")));
        }
        let compression = r.read_u16(order)?;
        let channels = r.read_u16(order)?;
        let sample_rate = r.read_u32(order)?;
        let byte_rate = r.read_u32(order)?;
        let block_align = r.read_u16(order)?;
        let bits_per_sample = r.read_u16(order)?;
        let extra_format = if format_size >= EXTENDED_FORMAT_SIZE {
            let declared = r.read_u16(order)?;
            let extra = r.read_bytes((format_size - EXTENDED_FORMAT_SIZE) as usize)?;
            if declared as usize != extra.len() {
                tracing::warn!(declared, actual = extra.len(), "format extension size disagrees with chunk size");
            }
            Some(extra)
        } else {
            if format_size > PCM_FORMAT_SIZE {
                r.read_bytes((format_size - PCM_FORMAT_SIZE) as usize)?;
            }
            None
        };
        Ok(Self {
            chunk_id:        String::new(),
            chunk_size:      0,
            format:          String::new(),
            format_chunk_id: FORMAT_ID.to_owned(),
            format_size:     if extra_format.is_some() { format_size } else { PCM_FORMAT_SIZE },
            compression,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            extra_format,
            data_chunk_id:   String::new(),
            data_size:       0,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_payload(|w| self.write(w, ByteOrder::BigEndian))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut ContentReader::new(bytes), ByteOrder::BigEndian)
    }

    /// Write the header of a playable WAV file.  `data_size` bytes of samples
    /// must follow.
    pub fn write_wav_header<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = ContentWriter::new(writer);
        self.write(&mut w, ByteOrder::LittleEndian)?;
        w.flush()
    }

    /// Parse a RIFF/WAVE source up to the start of its `data` chunk.
    ///
    /// Chunks other than `fmt ` and `data` are skipped by their declared
    /// size.  On success the reader is positioned on the first sample byte.
    pub fn read_wav_header<R: Read + Seek>(r: &mut ContentReader<R>) -> Result<Self> {
        Self::parse_wav_header(r).map_err(|e| match e {
            MiwaError::EndOfStream => MiwaError::invalid("truncated audio header"),
            other => other,
        })
    }

    fn parse_wav_header<R: Read + Seek>(r: &mut ContentReader<R>) -> Result<Self> {
        let order = ByteOrder::LittleEndian;
        let chunk_id = r.read_quick_string(TAG_LEN)?;
        if chunk_id != RIFF_ID {
            return Err(MiwaError::invalid(format!("audio source is not RIFF (found {chunk_id:?})")));
        }
        let chunk_size = r.read_u32(order)?;
        let format = r.read_quick_string(TAG_LEN)?;
        if format != WAVE_ID {
            return Err(MiwaError::invalid(format!("audio source is not WAVE (found {format:?})")));
        }

        let mut fmt: Option<Self> = None;
        loop {
            let id = r.read_quick_string(TAG_LEN)?;
            let size = r.read_u32(order)?;
            match id.as_str() {
                FORMAT_ID => fmt = Some(Self::read_format_fields(r, order, size)?),
                DATA_ID => {
                    let mut meta = fmt.ok_or_else(|| {
                        MiwaError::invalid("data chunk precedes the format chunk")
                    })?;
                    meta.chunk_id = chunk_id;
                    meta.chunk_size = chunk_size;
                    meta.format = format;
                    meta.data_chunk_id = id;
                    meta.data_size = size;
                    meta.validate()?;
                    return Ok(meta);
                }
                _ => {
                    tracing::debug!(chunk = %id, size, "skipping RIFF chunk");
                    r.skip(size as u64)?;
                }
            }
        }
    }
}

// ── Block payload dispatch ───────────────────────────────────────────────────

/// A decoded metadata block, surfaced verbatim by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Global(GlobalMetadata),
    Frame(FrameMetadata),
    Audio(AudioMetadata),
}

impl Metadata {
    pub fn block_type(&self) -> BlockType {
        match self {
            Metadata::Global(_) => BlockType::GlobalMetadata,
            Metadata::Frame(_)  => BlockType::FrameMetadata,
            Metadata::Audio(_)  => BlockType::AudioMetadata,
        }
    }

    /// Parse the payload of a metadata block.  Non-metadata types are
    /// `InvalidContent`.
    pub fn from_payload(block_type: BlockType, payload: &[u8]) -> Result<Self> {
        Ok(match block_type {
            BlockType::GlobalMetadata => Metadata::Global(GlobalMetadata::from_bytes(payload)?),
            BlockType::FrameMetadata  => Metadata::Frame(FrameMetadata::from_bytes(payload)?),
            BlockType::AudioMetadata  => Metadata::Audio(AudioMetadata::from_bytes(payload)?),
            other => {
                return Err(MiwaError::invalid(format!("{} block is not metadata", other.name())))
            }
        })
    }
}

fn to_payload(f: impl FnOnce(&mut ContentWriter<Cursor<Vec<u8>>>) -> Result<()>) -> Result<Vec<u8>> {
    let mut w = ContentWriter::new(Cursor::new(Vec::new()));
    f(&mut w)?;
    Ok(w.into_inner().into_inner())
}
