//! MIWA: a block-structured container for motion JPEG video with
//! interleaved PCM audio.
//!
//! ```text
//! [GlobalMetadata][FrameMetadata]{ [AudioMetadata] [Audio]* [Frame] }*
//! ```
//!
//! [`MiwaEncoder`] assembles a container from JPEG frames and WAV sources;
//! [`MiwaDecoder`] streams it back as one-second [`Track`]s.

pub mod error;
pub mod variant;
pub mod stream;
pub mod block;
pub mod metadata;
pub mod attribute;
pub mod container;
pub mod jpeg;
pub mod decoder;
pub mod encoder;

pub use error::{MiwaError, Result};
pub use variant::{Variant, VariantKind};
pub use stream::{ByteOrder, ContentReader, ContentWriter};
pub use block::{BlockHeader, BlockType};
pub use metadata::{AudioMetadata, CodecInfo, FrameMetadata, GlobalMetadata, Metadata, SimpleVersion};
pub use attribute::{ContentAttribute, ContentAttributeCollection, ContentAttributeId};
pub use container::{MiwaReader, MiwaWriter};
pub use decoder::{DecodeEvent, DecoderState, MiwaDecoder, Track};
pub use encoder::{EncodeSummary, EncoderOptions, MiwaEncoder};
