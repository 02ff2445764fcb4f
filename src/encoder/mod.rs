//! Two-pass container encoder.
//!
//! ```no_run
//! use miwa::encoder::{no_audio, EncoderOptions, MiwaEncoder};
//!
//! let frames: Vec<Vec<u8>> = Vec::new(); // JPEG payloads
//! let mut enc = MiwaEncoder::new(EncoderOptions { frame_rate: 24, ..Default::default() })?;
//! let out = std::fs::File::create("clip.miwa")?;
//! let summary = enc.encode(out, frames, no_audio())?;
//! println!("{} frames", summary.global.frame_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Passes
//! 1. The body (AudioMetadata, Audio and Frame blocks) is staged into a
//!    [`SpooledTempFile`]: in memory up to
//!    [`EncoderOptions::staging_memory_limit`], spilled to an anonymous
//!    temporary file beyond that.
//! 2. Once every frame is staged the totals are known.  The GlobalMetadata
//!    and FrameMetadata blocks go to the output, followed by the staged body.
//!
//! Nothing is written to the output until pass 1 succeeds.  The staging
//! store is dropped on every exit path.
//!
//! # Interleaving
//! Before frames `0, r, 2r, ...` (`r` = frame rate) one Audio block is staged
//! from the current WAV source: one second of samples, aligned to whole
//! sample frames.  A source's AudioMetadata block precedes its first Audio
//! block.  Audio left over when the frames run out is dropped.

mod audio;

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use chrono::Utc;
use tempfile::SpooledTempFile;
use uuid::Uuid;

use crate::attribute::{ContentAttributeCollection, ContentAttributeId};
use crate::container::MiwaWriter;
use crate::error::{MiwaError, Result};
use crate::jpeg::{default_scaler, is_jpeg, probe_jpeg, FrameScaler, JpegInfo};
use crate::metadata::{
    AudioMetadata, CodecInfo, FrameMetadata, GlobalMetadata, MAX_FRAME_RATE, MAX_QUALITY,
    MIN_FRAME_RATE,
};
use crate::stream::MAX_STRING_LEN;
use crate::variant::Variant;

use audio::{AudioQueue, AudioStep};

pub const DEFAULT_QUALITY:      u8    = 85;
pub const DEFAULT_FRAME_RATE:   u8    = 30;
/// Body bytes kept in memory before staging spills to disk.
pub const DEFAULT_STAGING_LIMIT: usize = 16 * 1024 * 1024;

// ── EncoderOptions ───────────────────────────────────────────────────────────

/// Configuration for [`MiwaEncoder::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Target frame width; `None` takes it from the first frame.
    pub width:                Option<u16>,
    /// Target frame height; `None` takes it from the first frame.
    pub height:               Option<u16>,
    /// JPEG quality for resized frames and the FrameMetadata record, 0–100.
    pub quality:              u8,
    /// Frames per track, 8–60.
    pub frame_rate:           u8,
    pub title:                Option<String>,
    pub copyright:            Option<String>,
    pub staging_memory_limit: usize,
    /// Creation time in Unix milliseconds; `None` uses the clock.
    pub timestamp_ms:         Option<u64>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            width:                None,
            height:               None,
            quality:              DEFAULT_QUALITY,
            frame_rate:           DEFAULT_FRAME_RATE,
            title:                None,
            copyright:            None,
            staging_memory_limit: DEFAULT_STAGING_LIMIT,
            timestamp_ms:         None,
        }
    }
}

impl EncoderOptions {
    pub fn validate(&self) -> Result<()> {
        check_quality(self.quality)?;
        check_frame_rate(self.frame_rate)?;
        check_dimension("frame width", self.width)?;
        check_dimension("frame height", self.height)?;
        check_text("title", self.title.as_deref())?;
        check_text("copyright", self.copyright.as_deref())?;
        Ok(())
    }
}

fn check_quality(q: u8) -> Result<()> {
    if q > MAX_QUALITY {
        return Err(MiwaError::out_of_range("frame quality", q as i64, 0, MAX_QUALITY as i64));
    }
    Ok(())
}

fn check_frame_rate(r: u8) -> Result<()> {
    if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&r) {
        return Err(MiwaError::out_of_range(
            "frame rate", r as i64, MIN_FRAME_RATE as i64, MAX_FRAME_RATE as i64,
        ));
    }
    Ok(())
}

fn check_dimension(name: &'static str, v: Option<u16>) -> Result<()> {
    if v == Some(0) {
        return Err(MiwaError::out_of_range(name, 0, 1, u16::MAX as i64));
    }
    Ok(())
}

fn check_text(name: &'static str, v: Option<&str>) -> Result<()> {
    match v {
        Some(s) if s.len() > MAX_STRING_LEN => Err(MiwaError::out_of_range(
            name, s.len() as i64, 0, MAX_STRING_LEN as i64,
        )),
        _ => Ok(()),
    }
}

// ── Content ids ──────────────────────────────────────────────────────────────

/// Supplies the content id of each encoded container.
pub trait ContentIdSource {
    fn next_id(&mut self) -> Uuid;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomContentIds;

impl ContentIdSource for RandomContentIds {
    fn next_id(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

/// The same id every time, for reproducible output.
#[derive(Debug, Clone, Copy)]
pub struct FixedContentId(pub Uuid);

impl ContentIdSource for FixedContentId {
    fn next_id(&mut self) -> Uuid {
        self.0
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// What [`MiwaEncoder::encode`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub global:         GlobalMetadata,
    pub frame:          FrameMetadata,
    /// Metadata of the last audio source opened.
    pub audio:          Option<AudioMetadata>,
    pub audio_sources:  u32,
    pub resized_frames: u32,
    /// Total container size.
    pub bytes_written:  u64,
}

/// An empty audio source list for silent containers.
pub fn no_audio() -> std::iter::Empty<Cursor<Vec<u8>>> {
    std::iter::empty()
}

// ── MiwaEncoder ──────────────────────────────────────────────────────────────

pub struct MiwaEncoder {
    options:    EncoderOptions,
    attributes: ContentAttributeCollection,
    scaler:     Box<dyn FrameScaler>,
    ids:        Box<dyn ContentIdSource>,
}

impl MiwaEncoder {
    pub fn new(options: EncoderOptions) -> Result<Self> {
        options.validate()?;
        let mut enc = Self {
            options,
            attributes: ContentAttributeCollection::new(),
            scaler:     default_scaler(),
            ids:        Box::new(RandomContentIds),
        };
        enc.sync_attributes();
        Ok(enc)
    }

    /// Replace the image codec used for resizing.
    pub fn with_scaler(mut self, scaler: Box<dyn FrameScaler>) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_content_ids(mut self, ids: Box<dyn ContentIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Configured values before an encode; the written container's
    /// description after one.
    pub fn attributes(&self) -> &ContentAttributeCollection {
        &self.attributes
    }

    /// Set one of the configurable attributes.
    ///
    /// | Attribute | Kind | Bounds |
    /// |-----------|------|--------|
    /// | `FrameWidth`, `FrameHeight` | u16 | ≥ 1, `None` = auto-detect |
    /// | `FrameQuality` | u8 | 0–100 |
    /// | `FrameRate` | u8 | 8–60 |
    /// | `Title`, `Copyright` | string | `None` or empty = absent |
    ///
    /// Any other attribute is `ArgumentInvalid`.  A rejected call changes
    /// nothing.
    pub fn set_attribute(&mut self, id: ContentAttributeId, value: Option<Variant>) -> Result<()> {
        use ContentAttributeId::*;

        if let Some(v) = &value {
            if v.kind() != id.kind() {
                return Err(MiwaError::ArgumentInvalid(format!(
                    "attribute {id} holds {} values, not {}", id.kind(), v.kind()
                )));
            }
        }
        let required = |v: &Option<Variant>| {
            v.clone().ok_or_else(|| MiwaError::ArgumentInvalid(format!("attribute {id} requires a value")))
        };

        match id {
            FrameWidth | FrameHeight => {
                let dim = value.as_ref().map(Variant::to_u16).transpose()?;
                check_dimension(id.name(), dim)?;
                if id == FrameWidth {
                    self.options.width = dim;
                } else {
                    self.options.height = dim;
                }
            }
            FrameQuality => {
                let q = required(&value)?.to_u8()?;
                check_quality(q)?;
                self.options.quality = q;
            }
            FrameRate => {
                let r = required(&value)?.to_u8()?;
                check_frame_rate(r)?;
                self.options.frame_rate = r;
            }
            Title | Copyright => {
                let text = value.as_ref().map(Variant::to_text).transpose()?.filter(|s| !s.is_empty());
                check_text(id.name(), text.as_deref())?;
                if id == Title {
                    self.options.title = text;
                } else {
                    self.options.copyright = text;
                }
            }
            other => {
                return Err(MiwaError::ArgumentInvalid(format!("attribute {other} cannot be set")));
            }
        }
        self.sync_attributes();
        Ok(())
    }

    fn sync_attributes(&mut self) {
        use ContentAttributeId::*;
        let o = &self.options;
        self.attributes[FrameWidth] = o.width.map(Variant::from);
        self.attributes[FrameHeight] = o.height.map(Variant::from);
        self.attributes[FrameQuality] = Some(o.quality.into());
        self.attributes[FrameRate] = Some(o.frame_rate.into());
        self.attributes[Title] = o.title.clone().map(Variant::from);
        self.attributes[Copyright] = o.copyright.clone().map(Variant::from);
    }

    /// Encode `frames` (JPEG payloads, in display order) and `audio` (WAV
    /// sources, played back to back) into a container written to `output`.
    pub fn encode<W, F, S>(
        &mut self,
        mut output: W,
        frames:     impl IntoIterator<Item = F>,
        audio:      impl IntoIterator<Item = S>,
    ) -> Result<EncodeSummary>
    where
        W: Write,
        F: AsRef<[u8]>,
        S: Read + Seek,
    {
        let mut audio = AudioQueue::new(audio);
        let staging = SpooledTempFile::new(self.options.staging_memory_limit);
        let staged = self.stage(MiwaWriter::new(staging), frames.into_iter(), &mut audio)?;

        let options = &self.options;
        let frame_rate = options.frame_rate;
        let global = GlobalMetadata {
            content_id:        self.ids.next_id(),
            codec:             CodecInfo::miwa(),
            frame_count:       staged.frames,
            audio_block_count: staged.audio_blocks,
            duration_ms:       duration_ms(staged.frames, frame_rate),
            title:             options.title.clone().filter(|s| !s.is_empty()),
            copyright:         options.copyright.clone().filter(|s| !s.is_empty()),
            timestamp_ms:      options.timestamp_ms.unwrap_or_else(now_ms),
        };
        let frame = FrameMetadata::jpeg(staged.size.width, staged.size.height, options.quality, frame_rate);

        let mut body = staged.body;
        body.seek(SeekFrom::Start(0))?;
        let mut writer = MiwaWriter::new(&mut output);
        writer.write_global_metadata(&global)?;
        writer.write_frame_metadata(&frame)?;
        let header_bytes = writer.counts().bytes;
        let body_bytes = io::copy(&mut body, writer.get_mut())?;
        writer.flush()?;
        drop(body);

        tracing::info!(
            frames = global.frame_count,
            audio_blocks = global.audio_block_count,
            width = frame.width,
            height = frame.height,
            rate = frame.frame_rate,
            bytes = header_bytes + body_bytes,
            "encoded MIWA container"
        );

        self.attributes.apply_global(&global);
        self.attributes.apply_frame(&frame);
        if let Some(a) = &staged.audio {
            self.attributes.apply_audio(a);
        }

        Ok(EncodeSummary {
            global,
            frame,
            audio:          staged.audio,
            audio_sources:  audio.sources_opened(),
            resized_frames: staged.resized,
            bytes_written:  header_bytes + body_bytes,
        })
    }

    fn stage<F, S>(
        &self,
        mut body:   MiwaWriter<SpooledTempFile>,
        frames:     impl Iterator<Item = F>,
        audio:      &mut AudioQueue<S>,
    ) -> Result<Staged>
    where
        F: AsRef<[u8]>,
        S: Read + Seek,
    {
        let rate = self.options.frame_rate as u64;
        let mut size: Option<JpegInfo> = None;
        let mut last_audio: Option<AudioMetadata> = None;
        let mut count: u64 = 0;
        let mut resized = 0u32;

        for frame in frames {
            let frame = frame.as_ref();
            if !is_jpeg(frame) {
                return Err(MiwaError::invalid(format!("frame {count} is not a JPEG image")));
            }

            if count % rate == 0 {
                loop {
                    match audio.next_block()? {
                        AudioStep::Opened(meta) => {
                            body.write_audio_metadata(&meta)?;
                            last_audio = Some(meta);
                        }
                        AudioStep::Block(samples) => {
                            body.write_audio(&samples)?;
                            break;
                        }
                        AudioStep::Drained => break,
                    }
                }
            }

            let probed = probe_jpeg(frame)?;
            let target = *size.get_or_insert_with(|| JpegInfo {
                width:  self.options.width.unwrap_or(probed.width),
                height: self.options.height.unwrap_or(probed.height),
            });
            if probed == target {
                body.write_frame(frame)?;
            } else {
                tracing::debug!(
                    frame = count,
                    from = %format_args!("{}x{}", probed.width, probed.height),
                    to = %format_args!("{}x{}", target.width, target.height),
                    "resizing frame"
                );
                let scaled = self.scaler.scale(frame, target.width, target.height, self.options.quality)?;
                body.write_frame(&scaled)?;
                resized += 1;
            }
            count += 1;
        }

        let size = size.ok_or_else(|| {
            MiwaError::ArgumentInvalid("no frames to encode; frame size cannot be resolved".into())
        })?;
        let frames = u32::try_from(count)
            .map_err(|_| MiwaError::out_of_range("frame count", count as i64, 1, u32::MAX as i64))?;
        if !audio.is_drained() {
            tracing::warn!(frames, "audio outlasts the frames; the remainder is dropped");
        }

        let counts = body.counts();
        tracing::debug!(
            frames = counts.frames,
            audio_blocks = counts.audio,
            bytes = counts.bytes,
            "body staged"
        );
        body.flush()?;
        Ok(Staged {
            body: body.into_inner(),
            size,
            frames,
            audio_blocks: counts.audio,
            audio: last_audio,
            resized,
        })
    }
}

struct Staged {
    body:         SpooledTempFile,
    size:         JpegInfo,
    frames:       u32,
    audio_blocks: u32,
    audio:        Option<AudioMetadata>,
    resized:      u32,
}

/// Playback time of `frames` at `frame_rate`, rounded to the millisecond.
pub fn duration_ms(frames: u32, frame_rate: u8) -> u64 {
    (frames as f64 / frame_rate as f64 * 1000.0).round() as u64
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
