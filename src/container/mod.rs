//! Block-level container I/O.
//!
//! [`MiwaReader`] reads block headers, raw payloads and typed metadata
//! records; [`MiwaWriter`] emits them.  Nothing here checks whether a block
//! makes sense where it appears: ordering rules belong to the decoder and
//! encoder.  Metadata records are always big-endian inside a container.

use std::io::{Read, Seek, Write};

use crate::block::{BlockHeader, BlockType, BLOCK_HEADER_SIZE};
use crate::error::{MiwaError, Result};
use crate::metadata::{AudioMetadata, FrameMetadata, GlobalMetadata, Metadata};
use crate::stream::{ByteOrder, ContentReader, ContentWriter};

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct MiwaReader<R> {
    reader: ContentReader<R>,
}

impl<R: Read + Seek> MiwaReader<R> {
    pub fn new(inner: R) -> Self {
        Self { reader: ContentReader::new(inner) }
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    pub fn position(&mut self) -> Result<u64> {
        self.reader.position()
    }

    pub fn rewind_to(&mut self, pos: u64) -> Result<()> {
        self.reader.seek_to(pos)
    }

    pub fn read_block_header(&mut self) -> Result<BlockHeader> {
        BlockHeader::from_word(self.reader.read_u32(ByteOrder::BigEndian)?)
    }

    /// Like [`read_block_header`](Self::read_block_header), but a stream that
    /// ends exactly on a block boundary yields `None`.  A partial header is
    /// `EndOfStream`.
    pub fn next_block_header(&mut self) -> Result<Option<BlockHeader>> {
        let mut word = [0u8; BLOCK_HEADER_SIZE];
        let mut filled = 0;
        while filled < word.len() {
            let n = self.reader.get_mut().read(&mut word[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            BLOCK_HEADER_SIZE => BlockHeader::from_word(u32::from_be_bytes(word)).map(Some),
            _ => Err(MiwaError::EndOfStream),
        }
    }

    /// The `header.size` payload bytes that follow `header`.
    pub fn read_block(&mut self, header: &BlockHeader) -> Result<Vec<u8>> {
        self.reader.read_bytes(header.size as usize)
    }

    pub fn skip_block(&mut self, header: &BlockHeader) -> Result<()> {
        self.reader.skip(header.size as u64)
    }

    pub fn read_global_metadata(&mut self, header: &BlockHeader) -> Result<GlobalMetadata> {
        expect_type(header, BlockType::GlobalMetadata)?;
        GlobalMetadata::from_bytes(&self.read_block(header)?)
    }

    pub fn read_frame_metadata(&mut self, header: &BlockHeader) -> Result<FrameMetadata> {
        expect_type(header, BlockType::FrameMetadata)?;
        FrameMetadata::from_bytes(&self.read_block(header)?)
    }

    pub fn read_audio_metadata(&mut self, header: &BlockHeader) -> Result<AudioMetadata> {
        expect_type(header, BlockType::AudioMetadata)?;
        AudioMetadata::from_bytes(&self.read_block(header)?)
    }

    /// Read any metadata block's payload into its typed record.
    pub fn read_metadata(&mut self, header: &BlockHeader) -> Result<Metadata> {
        let payload = self.read_block(header)?;
        Metadata::from_payload(header.block_type, &payload)
    }
}

fn expect_type(header: &BlockHeader, expected: BlockType) -> Result<()> {
    if header.block_type != expected {
        return Err(MiwaError::invalid(format!(
            "expected {} block, found {}", expected.name(), header.block_type.name()
        )));
    }
    Ok(())
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Per-type tallies of everything a [`MiwaWriter`] has emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCounts {
    pub global_metadata: u32,
    pub frame_metadata:  u32,
    pub audio_metadata:  u32,
    pub frames:          u32,
    pub audio:           u32,
    /// Header plus payload bytes.
    pub bytes:           u64,
}

impl BlockCounts {
    fn record(&mut self, block_type: BlockType, payload_len: usize) {
        match block_type {
            BlockType::GlobalMetadata => self.global_metadata += 1,
            BlockType::FrameMetadata  => self.frame_metadata += 1,
            BlockType::AudioMetadata  => self.audio_metadata += 1,
            BlockType::Frame          => self.frames += 1,
            BlockType::Audio          => self.audio += 1,
            BlockType::Undefined      => {}
        }
        self.bytes += (BLOCK_HEADER_SIZE + payload_len) as u64;
    }
}

pub struct MiwaWriter<W: Write> {
    writer: ContentWriter<W>,
    counts: BlockCounts,
}

impl<W: Write> MiwaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: ContentWriter::new(inner), counts: BlockCounts::default() }
    }

    pub fn counts(&self) -> BlockCounts {
        self.counts
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.writer.get_mut()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Emit the header for `payload`, then the payload itself.
    pub fn write_block(&mut self, block_type: BlockType, payload: &[u8]) -> Result<()> {
        let header = BlockHeader::new(block_type, payload.len())?;
        self.writer.write_u32(header.to_word()?, ByteOrder::BigEndian)?;
        self.writer.write_bytes(payload)?;
        self.counts.record(block_type, payload.len());
        Ok(())
    }

    pub fn write_global_metadata(&mut self, meta: &GlobalMetadata) -> Result<()> {
        self.write_block(BlockType::GlobalMetadata, &meta.to_bytes()?)
    }

    pub fn write_frame_metadata(&mut self, meta: &FrameMetadata) -> Result<()> {
        self.write_block(BlockType::FrameMetadata, &meta.to_bytes()?)
    }

    pub fn write_audio_metadata(&mut self, meta: &AudioMetadata) -> Result<()> {
        self.write_block(BlockType::AudioMetadata, &meta.to_bytes()?)
    }

    pub fn write_metadata(&mut self, meta: &Metadata) -> Result<()> {
        match meta {
            Metadata::Global(g) => self.write_global_metadata(g),
            Metadata::Frame(f)  => self.write_frame_metadata(f),
            Metadata::Audio(a)  => self.write_audio_metadata(a),
        }
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.write_block(BlockType::Frame, frame)
    }

    pub fn write_audio(&mut self, samples: &[u8]) -> Result<()> {
        self.write_block(BlockType::Audio, samples)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }
}
