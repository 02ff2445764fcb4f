//! Resumable container decoder.
//!
//! # States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Initializing` | reading the leading metadata blocks |
//! | `Streaming` | pulling blocks and assembling tracks |
//! | `Paused` | the caller stopped a [`MiwaDecoder::decode`] loop; the next pull resumes |
//! | `Exhausted` | the stream is fully consumed |
//!
//! Initialization reads Global/Frame/[Audio] metadata until an AudioMetadata
//! block appears, or until the FrameMetadata block is read and the container
//! declares no audio at all.  The stream is then rewound to where the decoder
//! started, so streaming sees those metadata blocks again and surfaces them
//! like any later in-stream update.
//!
//! # Tracks
//! Frames accumulate into a buffer sized to the current frame rate.  A full
//! buffer, or the end of the stream with frames buffered, yields a [`Track`]
//! carrying those frames and the pending audio block, if any.
//!
//! The decoder is a cursor: every piece of parsing state lives in the
//! decoder itself, so stopping between pulls loses nothing.

use std::io::{Read, Seek};

use crate::attribute::ContentAttributeCollection;
use crate::block::BlockType;
use crate::container::MiwaReader;
use crate::error::{MiwaError, Result};
use crate::metadata::{AudioMetadata, FrameMetadata, GlobalMetadata, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Initializing,
    Streaming,
    Paused,
    Exhausted,
    /// A fatal error was returned; the decoder cannot continue.
    Failed,
    Closed,
}

/// One second of content: up to `frame_rate` frames plus at most one audio
/// block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Zero-based position of this track in the stream.
    pub index:       u32,
    /// Stream-wide number of the first frame in `frames`.
    pub first_frame: u64,
    pub frames:      Vec<Vec<u8>>,
    pub audio:       Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A metadata block, after the attributes were updated from it.
    Metadata(Metadata),
    Track(Track),
    Done,
}

pub struct MiwaDecoder<R> {
    reader:          Option<MiwaReader<R>>,
    origin:          u64,
    state:           DecoderState,
    attributes:      ContentAttributeCollection,
    global:          GlobalMetadata,
    frame:           FrameMetadata,
    audio:           Option<AudioMetadata>,

    frames:          Vec<Vec<u8>>,
    pending_audio:   Option<Vec<u8>>,
    tracks_emitted:  u32,
    frames_emitted:  u64,
}

impl<R: Read + Seek> MiwaDecoder<R> {
    /// Open a container positioned at its first block and read its header
    /// metadata.
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = MiwaReader::new(inner);
        let origin = reader.position()?;
        let mut attributes = ContentAttributeCollection::new();
        let (global, frame, audio) = Self::initialize(&mut reader, &mut attributes)?;
        reader.rewind_to(origin)?;

        tracing::info!(
            frames = global.frame_count,
            audio_blocks = global.audio_block_count,
            width = frame.width,
            height = frame.height,
            rate = frame.frame_rate,
            "opened MIWA container"
        );

        Ok(Self {
            reader: Some(reader),
            origin,
            state: DecoderState::Streaming,
            attributes,
            frames: Vec::with_capacity(frame.frame_rate as usize),
            global,
            frame,
            audio,
            pending_audio: None,
            tracks_emitted: 0,
            frames_emitted: 0,
        })
    }

    fn initialize(
        reader:     &mut MiwaReader<R>,
        attributes: &mut ContentAttributeCollection,
    ) -> Result<(GlobalMetadata, FrameMetadata, Option<AudioMetadata>)> {
        let mut global: Option<GlobalMetadata> = None;
        let mut frame: Option<FrameMetadata> = None;
        let mut audio: Option<AudioMetadata> = None;

        while let Some(header) = reader.next_block_header()? {
            match header.block_type {
                BlockType::GlobalMetadata => {
                    let g = reader.read_global_metadata(&header)?;
                    check_codec(&g)?;
                    attributes.apply_global(&g);
                    global = Some(g);
                }
                BlockType::FrameMetadata => {
                    let f = reader.read_frame_metadata(&header)?;
                    f.validate()?;
                    attributes.apply_frame(&f);
                    frame = Some(f);
                    if global.as_ref().is_some_and(|g| g.audio_block_count == 0) {
                        break;
                    }
                }
                BlockType::AudioMetadata => {
                    let a = reader.read_audio_metadata(&header)?;
                    a.validate()?;
                    attributes.apply_audio(&a);
                    audio = Some(a);
                    break;
                }
                other => {
                    return Err(MiwaError::invalid(format!(
                        "unexpected {} block before the container metadata", other.name()
                    )))
                }
            }
        }

        let global = global.ok_or_else(|| MiwaError::invalid("container has no global metadata"))?;
        let frame = frame.ok_or_else(|| MiwaError::invalid("container has no frame metadata"))?;
        Ok((global, frame, audio))
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn attributes(&self) -> &ContentAttributeCollection {
        &self.attributes
    }

    /// The most recent GlobalMetadata seen.
    pub fn global_metadata(&self) -> &GlobalMetadata {
        &self.global
    }

    /// The most recent FrameMetadata seen.
    pub fn frame_metadata(&self) -> &FrameMetadata {
        &self.frame
    }

    /// The most recent AudioMetadata seen, if the container has audio.
    pub fn audio_metadata(&self) -> Option<&AudioMetadata> {
        self.audio.as_ref()
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn tracks_emitted(&self) -> u32 {
        self.tracks_emitted
    }

    // ── Cursor ───────────────────────────────────────────────────────────────

    /// Pull the next event from the stream.
    pub fn next_event(&mut self) -> Result<DecodeEvent> {
        match self.state {
            DecoderState::Closed => return Err(MiwaError::Disposed),
            DecoderState::Failed => {
                return Err(MiwaError::invalid("decoder stopped after an earlier error"))
            }
            _ => {}
        }
        if self.state == DecoderState::Exhausted {
            return Ok(DecodeEvent::Done);
        }
        self.state = DecoderState::Streaming;
        match self.pull() {
            Ok(event) => Ok(event),
            Err(e) => {
                tracing::warn!(error = %e, track = self.tracks_emitted, "decode failed");
                self.state = DecoderState::Failed;
                Err(e)
            }
        }
    }

    /// Pull the next track, surfacing metadata only through the attributes.
    /// `None` once the stream is exhausted.
    pub fn next_track(&mut self) -> Result<Option<Track>> {
        loop {
            match self.next_event()? {
                DecodeEvent::Metadata(_) => continue,
                DecodeEvent::Track(track) => return Ok(Some(track)),
                DecodeEvent::Done => return Ok(None),
            }
        }
    }

    /// Iterate over the remaining tracks.  Stops after the first error.
    pub fn tracks(&mut self) -> Tracks<'_, R> {
        Tracks { decoder: self, finished: false }
    }

    /// Callback-driven decoding.  Each track is handed to `on_track`;
    /// returning `false` pauses and this method returns `Ok(false)`.  Calling
    /// it again resumes with the next track.  `Ok(true)` means the stream is
    /// exhausted.  Pausing on the final track leaves the state `Exhausted`.
    pub fn decode<F>(&mut self, on_track: F) -> Result<bool>
    where
        F: FnMut(Track) -> bool,
    {
        self.decode_with(on_track, |_| {})
    }

    /// [`decode`](Self::decode) with a second callback receiving every
    /// metadata block verbatim.
    pub fn decode_with<F, M>(&mut self, mut on_track: F, mut on_metadata: M) -> Result<bool>
    where
        F: FnMut(Track) -> bool,
        M: FnMut(&Metadata),
    {
        loop {
            match self.next_event()? {
                DecodeEvent::Metadata(meta) => on_metadata(&meta),
                DecodeEvent::Track(track) => {
                    if !on_track(track) {
                        if self.state != DecoderState::Exhausted {
                            self.state = DecoderState::Paused;
                        }
                        return Ok(false);
                    }
                }
                DecodeEvent::Done => return Ok(true),
            }
        }
    }

    /// Restart from the first block, discarding buffered frames and audio.
    pub fn rewind(&mut self) -> Result<()> {
        let origin = self.origin;
        self.reader_mut()?.rewind_to(origin)?;
        self.frames.clear();
        self.pending_audio = None;
        self.tracks_emitted = 0;
        self.frames_emitted = 0;
        self.state = DecoderState::Streaming;
        Ok(())
    }

    /// Release the underlying stream.  Later calls fail with `Disposed`.
    pub fn close(&mut self) -> Option<R> {
        self.state = DecoderState::Closed;
        self.frames.clear();
        self.pending_audio = None;
        self.reader.take().map(MiwaReader::into_inner)
    }

    fn reader_mut(&mut self) -> Result<&mut MiwaReader<R>> {
        self.reader.as_mut().ok_or(MiwaError::Disposed)
    }

    fn pull(&mut self) -> Result<DecodeEvent> {
        loop {
            let header = match self.reader_mut()?.next_block_header()? {
                Some(h) => h,
                None => {
                    // A rate decrease can leave more than one track buffered.
                    if self.frames.len() > self.frame.frame_rate as usize {
                        return Ok(DecodeEvent::Track(self.take_track()));
                    }
                    self.state = DecoderState::Exhausted;
                    tracing::debug!(tracks = self.tracks_emitted, "container exhausted");
                    if !self.frames.is_empty() || self.pending_audio.is_some() {
                        return Ok(DecodeEvent::Track(self.take_track()));
                    }
                    return Ok(DecodeEvent::Done);
                }
            };
            tracing::trace!(kind = header.block_type.name(), size = header.size, "block");

            match header.block_type {
                BlockType::GlobalMetadata | BlockType::FrameMetadata | BlockType::AudioMetadata => {
                    let meta = self.reader_mut()?.read_metadata(&header)?;
                    self.apply_metadata(&meta)?;
                    return Ok(DecodeEvent::Metadata(meta));
                }
                BlockType::Audio => {
                    let samples = self.reader_mut()?.read_block(&header)?;
                    if self.pending_audio.is_some() {
                        tracing::warn!(
                            track = self.tracks_emitted,
                            "audio block arrived before the previous track filled; flushing early"
                        );
                        let track = self.take_track();
                        self.pending_audio = Some(samples);
                        return Ok(DecodeEvent::Track(track));
                    }
                    self.pending_audio = Some(samples);
                }
                BlockType::Frame => {
                    let frame = self.reader_mut()?.read_block(&header)?;
                    self.frames.push(frame);
                    if self.frames.len() >= self.frame.frame_rate as usize {
                        return Ok(DecodeEvent::Track(self.take_track()));
                    }
                }
                BlockType::Undefined => {
                    return Err(MiwaError::invalid("undefined block in container"));
                }
            }
        }
    }

    fn apply_metadata(&mut self, meta: &Metadata) -> Result<()> {
        match meta {
            Metadata::Global(g) => {
                check_codec(g)?;
                self.global = g.clone();
            }
            Metadata::Frame(f) => {
                f.validate()?;
                if f.frame_rate != self.frame.frame_rate {
                    tracing::debug!(from = self.frame.frame_rate, to = f.frame_rate, "frame rate changed");
                }
                self.frame = f.clone();
            }
            Metadata::Audio(a) => {
                a.validate()?;
                self.audio = Some(a.clone());
            }
        }
        self.attributes.apply(meta);
        Ok(())
    }

    /// Assemble a track from at most one frame rate's worth of buffered frames.
    fn take_track(&mut self) -> Track {
        let rate = self.frame.frame_rate as usize;
        let frames = if self.frames.len() <= rate {
            std::mem::replace(&mut self.frames, Vec::with_capacity(rate))
        } else {
            self.frames.drain(..rate).collect()
        };
        let track = Track {
            index:       self.tracks_emitted,
            first_frame: self.frames_emitted,
            audio:       self.pending_audio.take(),
            frames,
        };
        self.tracks_emitted += 1;
        self.frames_emitted += track.frames.len() as u64;
        tracing::debug!(
            index = track.index,
            frames = track.frames.len(),
            audio = track.audio.is_some(),
            "track assembled"
        );
        track
    }
}

fn check_codec(global: &GlobalMetadata) -> Result<()> {
    if !global.codec.is_supported() {
        return Err(MiwaError::invalid(format!("unsupported codec {}", global.codec)));
    }
    Ok(())
}

/// Iterator over the remaining tracks of a [`MiwaDecoder`].
pub struct Tracks<'a, R> {
    decoder:  &'a mut MiwaDecoder<R>,
    finished: bool,
}

impl<R: Read + Seek> Iterator for Tracks<'_, R> {
    type Item = Result<Track>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.decoder.next_track() {
            Ok(Some(track)) => Some(Ok(track)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests;
