//! Content attributes: the generic description of a container's content.
//!
//! The schema is closed: [`ContentAttributeCollection`] always holds every
//! [`ContentAttributeId`], each bound to an optional [`Variant`].  Values
//! arrive incrementally (metadata blocks while decoding, totals while
//! encoding); keys never come or go.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{MiwaError, Result};
use crate::metadata::{AudioMetadata, FrameMetadata, GlobalMetadata, Metadata};
use crate::variant::{Variant, VariantKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentAttributeId {
    Guid,
    Codec,
    CodecVersion,
    FrameFormat,
    FrameWidth,
    FrameHeight,
    FrameQuality,
    FrameRate,
    FrameCount,
    AudioFormat,
    AudioBlockCount,
    AudioChannels,
    AudioSampleRate,
    Duration,
    Title,
    Copyright,
    Timestamp,
}

impl ContentAttributeId {
    pub const ALL: [ContentAttributeId; 17] = [
        ContentAttributeId::Guid,
        ContentAttributeId::Codec,
        ContentAttributeId::CodecVersion,
        ContentAttributeId::FrameFormat,
        ContentAttributeId::FrameWidth,
        ContentAttributeId::FrameHeight,
        ContentAttributeId::FrameQuality,
        ContentAttributeId::FrameRate,
        ContentAttributeId::FrameCount,
        ContentAttributeId::AudioFormat,
        ContentAttributeId::AudioBlockCount,
        ContentAttributeId::AudioChannels,
        ContentAttributeId::AudioSampleRate,
        ContentAttributeId::Duration,
        ContentAttributeId::Title,
        ContentAttributeId::Copyright,
        ContentAttributeId::Timestamp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ContentAttributeId::Guid            => "guid",
            ContentAttributeId::Codec           => "codec",
            ContentAttributeId::CodecVersion    => "codec-version",
            ContentAttributeId::FrameFormat     => "frame-format",
            ContentAttributeId::FrameWidth      => "frame-width",
            ContentAttributeId::FrameHeight     => "frame-height",
            ContentAttributeId::FrameQuality    => "frame-quality",
            ContentAttributeId::FrameRate       => "frame-rate",
            ContentAttributeId::FrameCount      => "frame-count",
            ContentAttributeId::AudioFormat     => "audio-format",
            ContentAttributeId::AudioBlockCount => "audio-block-count",
            ContentAttributeId::AudioChannels   => "audio-channels",
            ContentAttributeId::AudioSampleRate => "audio-sample-rate",
            ContentAttributeId::Duration        => "duration",
            ContentAttributeId::Title           => "title",
            ContentAttributeId::Copyright       => "copyright",
            ContentAttributeId::Timestamp       => "timestamp",
        }
    }

    /// The variant kind every value of this attribute carries.
    pub fn kind(self) -> VariantKind {
        match self {
            ContentAttributeId::Guid => VariantKind::Bytes,
            ContentAttributeId::Codec
            | ContentAttributeId::FrameFormat
            | ContentAttributeId::Title
            | ContentAttributeId::Copyright => VariantKind::String,
            ContentAttributeId::FrameWidth
            | ContentAttributeId::FrameHeight
            | ContentAttributeId::AudioFormat
            | ContentAttributeId::AudioChannels => VariantKind::U16,
            ContentAttributeId::FrameQuality | ContentAttributeId::FrameRate => VariantKind::U8,
            ContentAttributeId::CodecVersion
            | ContentAttributeId::FrameCount
            | ContentAttributeId::AudioBlockCount
            | ContentAttributeId::AudioSampleRate => VariantKind::U32,
            ContentAttributeId::Duration | ContentAttributeId::Timestamp => VariantKind::U64,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ContentAttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named, optional, typed fact about the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAttribute {
    pub id:    ContentAttributeId,
    pub value: Option<Variant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAttributeCollection {
    values: [Option<Variant>; ContentAttributeId::ALL.len()],
}

impl Default for ContentAttributeCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentAttributeCollection {
    /// Every recognized attribute, each without a value.
    pub fn new() -> Self {
        Self { values: Default::default() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains_key(&self, _id: ContentAttributeId) -> bool {
        true
    }

    pub fn get(&self, id: ContentAttributeId) -> Option<&Variant> {
        self.values[id.slot()].as_ref()
    }

    /// Replace the value of `id`.  A value of the wrong kind is rejected and
    /// leaves the previous value in place.
    pub fn set(&mut self, id: ContentAttributeId, value: Option<Variant>) -> Result<()> {
        if let Some(v) = &value {
            if v.kind() != id.kind() {
                return Err(MiwaError::ArgumentInvalid(format!(
                    "attribute {id} holds {} values, not {}", id.kind(), v.kind()
                )));
            }
        }
        self.values[id.slot()] = value;
        Ok(())
    }

    /// Always fails: the attribute schema is closed.
    pub fn insert(&mut self, id: ContentAttributeId, _value: Variant) -> Result<()> {
        Err(MiwaError::ArgumentInvalid(format!("cannot insert {id}: attribute schema is closed")))
    }

    /// Always fails: the attribute schema is closed.
    pub fn remove(&mut self, id: ContentAttributeId) -> Result<Option<Variant>> {
        Err(MiwaError::ArgumentInvalid(format!("cannot remove {id}: attribute schema is closed")))
    }

    /// Always fails: the attribute schema is closed.
    pub fn clear(&mut self) -> Result<()> {
        Err(MiwaError::ArgumentInvalid("cannot clear a closed attribute schema".into()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContentAttributeId, Option<&Variant>)> + '_ {
        ContentAttributeId::ALL.iter().map(move |&id| (id, self.get(id)))
    }

    /// Snapshot of every attribute.
    pub fn to_vec(&self) -> Vec<ContentAttribute> {
        self.iter()
            .map(|(id, value)| ContentAttribute { id, value: value.cloned() })
            .collect()
    }

    pub fn apply(&mut self, meta: &Metadata) {
        match meta {
            Metadata::Global(g) => self.apply_global(g),
            Metadata::Frame(f)  => self.apply_frame(f),
            Metadata::Audio(a)  => self.apply_audio(a),
        }
    }

    pub fn apply_global(&mut self, g: &GlobalMetadata) {
        use ContentAttributeId::*;
        self.put(Guid, g.content_id.as_bytes().to_vec());
        self.put(Codec, g.codec.name.clone());
        self.put(CodecVersion, g.codec.version.packed());
        self.put(FrameCount, g.frame_count);
        self.put(AudioBlockCount, g.audio_block_count);
        self.put(Duration, g.duration_ms);
        self.values[Title.slot()] = g.title.clone().map(Variant::from);
        self.values[Copyright.slot()] = g.copyright.clone().map(Variant::from);
        self.put(Timestamp, g.timestamp_ms);
    }

    pub fn apply_frame(&mut self, f: &FrameMetadata) {
        use ContentAttributeId::*;
        self.put(FrameFormat, f.format.clone());
        self.put(FrameWidth, f.width);
        self.put(FrameHeight, f.height);
        self.put(FrameQuality, f.quality);
        self.put(FrameRate, f.frame_rate);
    }

    pub fn apply_audio(&mut self, a: &AudioMetadata) {
        use ContentAttributeId::*;
        self.put(AudioFormat, a.compression);
        self.put(AudioChannels, a.channels);
        self.put(AudioSampleRate, a.sample_rate);
    }

    fn put(&mut self, id: ContentAttributeId, value: impl Into<Variant>) {
        let value = value.into();
        debug_assert_eq!(value.kind(), id.kind(), "{id}");
        self.values[id.slot()] = Some(value);
    }
}

impl Index<ContentAttributeId> for ContentAttributeCollection {
    type Output = Option<Variant>;

    fn index(&self, id: ContentAttributeId) -> &Self::Output {
        &self.values[id.slot()]
    }
}

/// Slot access for in-place replacement.  Unlike [`ContentAttributeCollection::set`]
/// this does not check the value kind.
impl IndexMut<ContentAttributeId> for ContentAttributeCollection {
    fn index_mut(&mut self, id: ContentAttributeId) -> &mut Self::Output {
        &mut self.values[id.slot()]
    }
}
