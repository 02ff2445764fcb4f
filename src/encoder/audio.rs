//! Sequential reader over the queued WAV sources of one encode.

use std::collections::VecDeque;
use std::io::{Read, Seek};

use crate::error::Result;
use crate::metadata::AudioMetadata;
use crate::stream::ContentReader;

/// One source whose RIFF header has been parsed; the reader sits inside its
/// `data` chunk.
struct OpenSource<S> {
    reader:    ContentReader<S>,
    meta:      AudioMetadata,
    remaining: u64,
}

/// What [`AudioQueue::next_block`] produced.
pub(crate) enum AudioStep {
    /// A new source was opened; its metadata must be staged before its blocks.
    Opened(AudioMetadata),
    Block(Vec<u8>),
    /// Every source is exhausted.
    Drained,
}

pub(crate) struct AudioQueue<S> {
    pending: VecDeque<S>,
    current: Option<OpenSource<S>>,
    opened:  u32,
}

impl<S: Read + Seek> AudioQueue<S> {
    pub(crate) fn new(sources: impl IntoIterator<Item = S>) -> Self {
        Self { pending: sources.into_iter().collect(), current: None, opened: 0 }
    }

    pub(crate) fn sources_opened(&self) -> u32 {
        self.opened
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.current.as_ref().map_or(true, |c| c.remaining == 0)
    }

    /// Advance to the next audio block, opening the next queued source when
    /// the current one is missing or exhausted.  Callers loop until they get
    /// a `Block` or `Drained`.
    pub(crate) fn next_block(&mut self) -> Result<AudioStep> {
        if let Some(src) = self.current.as_mut() {
            if src.remaining > 0 {
                let len = (src.meta.block_size() as u64).min(src.remaining);
                let block = src.reader.read_bytes(len as usize)?;
                src.remaining -= len;
                return Ok(AudioStep::Block(block));
            }
            self.current = None;
        }

        let Some(inner) = self.pending.pop_front() else {
            return Ok(AudioStep::Drained);
        };
        let mut reader = ContentReader::new(inner);
        let mut meta = AudioMetadata::read_wav_header(&mut reader)?;
        // Streamed WAVs may declare more data than the file holds; the stored
        // header describes the bytes actually present.
        let available = reader.remaining()?;
        let remaining = (meta.data_size as u64).min(available);
        if remaining < meta.data_size as u64 {
            tracing::warn!(
                declared = meta.data_size,
                available,
                "audio data chunk is shorter than declared"
            );
            let missing = meta.data_size - remaining as u32;
            meta.data_size = remaining as u32;
            meta.chunk_size = meta.chunk_size.saturating_sub(missing);
        }
        self.opened += 1;
        tracing::debug!(
            source = self.opened,
            channels = meta.channels,
            sample_rate = meta.sample_rate,
            bytes = remaining,
            "opened audio source"
        );
        self.current = Some(OpenSource { reader, meta: meta.clone(), remaining });
        Ok(AudioStep::Opened(meta))
    }
}
