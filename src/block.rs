//! Block framing: the 32-bit header that precedes every unit in a container.
//!
//! ```text
//!  31                                 8 7          0
//! +------------------------------------+------------+
//! |        payload size (24 bits)      |  type tag  |
//! +------------------------------------+------------+
//! ```
//!
//! The word is written big-endian.  A block is not self-terminating beyond
//! its declared size: a corrupt size desynchronizes everything after it.
//!
//! Packing is a pure function of both fields.  There is no way to update one
//! field of an existing word in place.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{MiwaError, Result};

/// Size of a block header on disk.
pub const BLOCK_HEADER_SIZE: usize = 4;
/// Largest payload a single block can carry.
pub const MAX_BLOCK_SIZE:    u32   = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum BlockType {
    Undefined      = 0,
    GlobalMetadata = 1,
    FrameMetadata  = 2,
    AudioMetadata  = 3,
    Frame          = 4,
    Audio          = 5,
}

impl BlockType {
    pub fn name(self) -> &'static str {
        match self {
            BlockType::Undefined      => "undefined",
            BlockType::GlobalMetadata => "global-metadata",
            BlockType::FrameMetadata  => "frame-metadata",
            BlockType::AudioMetadata  => "audio-metadata",
            BlockType::Frame          => "frame",
            BlockType::Audio          => "audio",
        }
    }

    pub fn is_metadata(self) -> bool {
        matches!(
            self,
            BlockType::GlobalMetadata | BlockType::FrameMetadata | BlockType::AudioMetadata
        )
    }
}

impl TryFrom<u8> for BlockType {
    type Error = MiwaError;

    fn try_from(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => BlockType::Undefined,
            1 => BlockType::GlobalMetadata,
            2 => BlockType::FrameMetadata,
            3 => BlockType::AudioMetadata,
            4 => BlockType::Frame,
            5 => BlockType::Audio,
            other => return Err(MiwaError::invalid(format!("unknown block type 0x{other:02x}"))),
        })
    }
}

/// Pack a type tag and payload size into one header word.
pub fn pack(block_type: u8, size: u32) -> Result<u32> {
    if size > MAX_BLOCK_SIZE {
        return Err(MiwaError::out_of_range("block size", size as i64, 0, MAX_BLOCK_SIZE as i64));
    }
    Ok((size << 8) | block_type as u32)
}

/// Split a header word into its type tag and payload size.
#[inline]
pub fn unpack(word: u32) -> (u8, u32) {
    ((word & 0xFF) as u8, (word & 0xFFFF_FF00) >> 8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    pub block_type: BlockType,
    pub size:       u32,
}

impl BlockHeader {
    pub fn new(block_type: BlockType, size: usize) -> Result<Self> {
        if size > MAX_BLOCK_SIZE as usize {
            return Err(MiwaError::out_of_range("block size", size as i64, 0, MAX_BLOCK_SIZE as i64));
        }
        Ok(Self { block_type, size: size as u32 })
    }

    pub fn to_word(&self) -> Result<u32> {
        pack(self.block_type as u8, self.size)
    }

    /// Decode a header word.  Unknown type tags are `InvalidContent`.
    pub fn from_word(word: u32) -> Result<Self> {
        let (tag, size) = unpack(word);
        Ok(Self { block_type: BlockType::try_from(tag)?, size })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.to_word()?)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        Self::from_word(reader.read_u32::<BigEndian>()?)
    }
}
