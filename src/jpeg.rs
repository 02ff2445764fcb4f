//! Frame payload inspection and the image-codec seam.
//!
//! Frames are opaque JPEG blobs to the container.  The encoder only needs two
//! things from them: the start-of-image marker (validation) and the pixel
//! dimensions from the first start-of-frame segment (auto-detecting the
//! container resolution and spotting frames that must be resized).  Resizing
//! itself is delegated to a [`FrameScaler`].

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use crate::error::{MiwaError, Result};

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width:  u16,
    pub height: u16,
}

/// True if `frame` starts with the JPEG start-of-image marker.
pub fn is_jpeg(frame: &[u8]) -> bool {
    frame.starts_with(&JPEG_SOI)
}

/// Read the dimensions of a baseline or progressive JPEG.
pub fn probe_jpeg(frame: &[u8]) -> Result<JpegInfo> {
    if !is_jpeg(frame) {
        return Err(MiwaError::invalid("frame does not start with a JPEG SOI marker"));
    }
    probe_segments(frame).map_err(|e| match e {
        MiwaError::EndOfStream => MiwaError::invalid("JPEG ended before a start-of-frame segment"),
        other => other,
    })
}

fn probe_segments(frame: &[u8]) -> Result<JpegInfo> {
    let mut r = Cursor::new(frame);
    r.seek(SeekFrom::Start(JPEG_SOI.len() as u64))?;
    loop {
        if r.read_u8()? != 0xFF {
            return Err(MiwaError::invalid("invalid JPEG marker"));
        }
        let mut marker = r.read_u8()?;
        // fill bytes
        while marker == 0xFF {
            marker = r.read_u8()?;
        }
        match marker {
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                let _len = r.read_u16::<BigEndian>()?;
                let _precision = r.read_u8()?;
                let height = r.read_u16::<BigEndian>()?;
                let width = r.read_u16::<BigEndian>()?;
                return Ok(JpegInfo { width, height });
            }
            0xD9 | 0xDA => return Err(MiwaError::invalid("JPEG has no start-of-frame segment")),
            0x01 | 0xD0..=0xD7 => {}
            _ => {
                let len = r
                    .read_u16::<BigEndian>()?
                    .checked_sub(2)
                    .ok_or_else(|| MiwaError::invalid("invalid JPEG segment length"))?;
                r.seek(SeekFrom::Current(len as i64))?;
            }
        }
    }
}

/// External image codec: produce a JPEG of exactly `width` x `height` from an
/// encoded frame.
pub trait FrameScaler {
    fn scale(&self, jpeg: &[u8], width: u16, height: u16, quality: u8) -> Result<Vec<u8>>;
}

/// Refuses every resize.  Frames must already match the container size.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectScaler;

impl FrameScaler for RejectScaler {
    fn scale(&self, _jpeg: &[u8], width: u16, height: u16, _quality: u8) -> Result<Vec<u8>> {
        Err(MiwaError::invalid(format!(
            "frame must be resized to {width}x{height} but no image codec is available"
        )))
    }
}

/// Decode, resize and re-encode with the `image` crate.
#[cfg(feature = "jpeg")]
#[derive(Debug, Clone, Copy)]
pub struct ImageScaler {
    pub filter: ::image::imageops::FilterType,
}

#[cfg(feature = "jpeg")]
impl Default for ImageScaler {
    fn default() -> Self {
        Self { filter: ::image::imageops::FilterType::Triangle }
    }
}

#[cfg(feature = "jpeg")]
impl FrameScaler for ImageScaler {
    fn scale(&self, jpeg: &[u8], width: u16, height: u16, quality: u8) -> Result<Vec<u8>> {
        use ::image::codecs::jpeg::JpegEncoder;

        let img = ::image::load_from_memory_with_format(jpeg, ::image::ImageFormat::Jpeg)
            .map_err(|e| MiwaError::Image(e.to_string()))?;
        let resized = img
            .resize_exact(width as u32, height as u32, self.filter)
            .to_rgb8();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        ::image::DynamicImage::ImageRgb8(resized)
            .write_with_encoder(encoder)
            .map_err(|e| MiwaError::Image(e.to_string()))?;
        Ok(out)
    }
}

/// The scaler used when the caller supplies none.
pub fn default_scaler() -> Box<dyn FrameScaler> {
    #[cfg(feature = "jpeg")]
    {
        Box::new(ImageScaler::default())
    }
    #[cfg(not(feature = "jpeg"))]
    {
        Box::new(RejectScaler)
    }
}
