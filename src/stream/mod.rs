//! Endianness-aware binary primitives over a byte stream.
//!
//! # Byte order
//! Every multi-byte numeric call names its [`ByteOrder`] explicitly.  The
//! container itself is big-endian ("network order"); little-endian exists for
//! RIFF/WAVE compatibility; host order is only for values that are
//! reinterpreted in-process and never persisted.
//!
//! # Strings
//! - *Length-prefixed string*: u16 byte length, then UTF-8 bytes.
//! - *Quick string*: up to 8 ASCII bytes stored in the smallest of 1/2/4/8
//!   bytes that fits the declared length, NUL padded.  Used for short tags
//!   such as `RIFF`, `WAVE`, `JPEG` and the codec name.
//!
//! # Ownership
//! [`ContentReader`] and [`ContentWriter`] own their stream; dropping them
//! closes it.  Use [`ContentReader::into_inner`] (or wrap a `&mut` stream) to
//! keep the underlying stream open.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{MiwaError, Result};
use crate::variant::BaseType;

/// Longest length-prefixed string, in bytes.
pub const MAX_STRING_LEN:       usize = u16::MAX as usize;
/// Longest quick string, in bytes.
pub const MAX_QUICK_STRING_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Container default.
    #[default]
    BigEndian,
    LittleEndian,
    HostOrder,
}

impl ByteOrder {
    /// True when values in this order must be byte-reversed relative to the host.
    #[inline]
    pub fn needs_swap(self) -> bool {
        match self {
            ByteOrder::BigEndian    => cfg!(target_endian = "little"),
            ByteOrder::LittleEndian => cfg!(target_endian = "big"),
            ByteOrder::HostOrder    => false,
        }
    }
}

/// Storage width of a quick string declared with `len` characters.
pub fn quick_string_width(len: usize) -> Result<usize> {
    match len {
        0..=1 => Ok(1),
        2     => Ok(2),
        3..=4 => Ok(4),
        5..=8 => Ok(8),
        _     => Err(MiwaError::out_of_range(
            "quick string length", len as i64, 0, MAX_QUICK_STRING_LEN as i64,
        )),
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

macro_rules! read_numeric {
    ($($name:ident => $t:ty, $as:ident;)*) => {
        $(
            pub fn $name(&mut self, order: ByteOrder) -> Result<$t> {
                Ok(self.read_base(std::mem::size_of::<$t>(), order)?.$as())
            }
        )*
    };
}

pub struct ContentReader<R> {
    inner: R,
}

impl<R: Read> ContentReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Release the underlying stream without closing it.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read exactly `buf.len()` bytes.  A short stream is `EndOfStream`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let got = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if got != len {
            return Err(MiwaError::EndOfStream);
        }
        Ok(buf)
    }

    fn read_base(&mut self, width: usize, order: ByteOrder) -> Result<BaseType> {
        let mut raw = [0u8; 8];
        self.inner.read_exact(&mut raw[..width])?;
        BaseType::from_ordered(&raw[..width], order)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_base(1, ByteOrder::HostOrder)?.as_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_base(1, ByteOrder::HostOrder)?.as_i8())
    }

    read_numeric! {
        read_u16 => u16, as_u16;
        read_i16 => i16, as_i16;
        read_u32 => u32, as_u32;
        read_i32 => i32, as_i32;
        read_u64 => u64, as_u64;
        read_i64 => i64, as_i64;
        read_f32 => f32, as_f32;
        read_f64 => f64, as_f64;
    }

    /// u16 length prefix (in `order`), then UTF-8 bytes.
    pub fn read_string(&mut self, order: ByteOrder) -> Result<String> {
        let len = self.read_u16(order)? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|e| MiwaError::invalid(format!("string is not valid UTF-8: {e}")))
    }

    /// Read a quick string declared with `len` characters.  Trailing NUL
    /// padding is dropped.
    pub fn read_quick_string(&mut self, len: usize) -> Result<String> {
        let width = quick_string_width(len)?;
        let mut raw = [0u8; MAX_QUICK_STRING_LEN];
        self.inner.read_exact(&mut raw[..width])?;
        let text = &raw[..len.min(width)];
        let end = text.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let text = &text[..end];
        if !text.is_ascii() {
            return Err(MiwaError::invalid("quick string is not ASCII"));
        }
        Ok(text.iter().map(|&b| b as char).collect())
    }
}

impl<R: Read + Seek> ContentReader<R> {
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Advance `len` bytes.  Skipping past the end is `EndOfStream`.
    pub fn skip(&mut self, len: u64) -> Result<()> {
        let start = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        if end.saturating_sub(start) < len {
            self.inner.seek(SeekFrom::Start(start))?;
            return Err(MiwaError::EndOfStream);
        }
        self.inner.seek(SeekFrom::Start(start + len))?;
        Ok(())
    }

    /// Bytes left between the current position and the end of the stream.
    pub fn remaining(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(end.saturating_sub(pos))
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

macro_rules! write_numeric {
    ($($name:ident => $t:ty, $from:ident;)*) => {
        $(
            pub fn $name(&mut self, v: $t, order: ByteOrder) -> Result<()> {
                self.write_base(BaseType::$from(v), std::mem::size_of::<$t>(), order)
            }
        )*
    };
}

pub struct ContentWriter<W> {
    inner: W,
}

impl<W: Write> ContentWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Release the underlying stream without closing it.
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    fn write_base(&mut self, base: BaseType, width: usize, order: ByteOrder) -> Result<()> {
        let raw = base.to_ordered(width, order)?;
        self.write_bytes(&raw[..width])
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_base(BaseType::from_u8(v), 1, ByteOrder::HostOrder)
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_base(BaseType::from_i8(v), 1, ByteOrder::HostOrder)
    }

    write_numeric! {
        write_u16 => u16, from_u16;
        write_i16 => i16, from_i16;
        write_u32 => u32, from_u32;
        write_i32 => i32, from_i32;
        write_u64 => u64, from_u64;
        write_i64 => i64, from_i64;
        write_f32 => f32, from_f32;
        write_f64 => f64, from_f64;
    }

    /// u16 length prefix (in `order`), then UTF-8 bytes.  Strings longer than
    /// [`MAX_STRING_LEN`] bytes are rejected before anything is written.
    pub fn write_string(&mut self, s: &str, order: ByteOrder) -> Result<()> {
        if s.len() > MAX_STRING_LEN {
            return Err(MiwaError::out_of_range(
                "string length", s.len() as i64, 0, MAX_STRING_LEN as i64,
            ));
        }
        self.write_u16(s.len() as u16, order)?;
        self.write_bytes(s.as_bytes())
    }

    /// Write `s` as a quick string declared with `len` characters.
    pub fn write_quick_string(&mut self, s: &str, len: usize) -> Result<()> {
        let width = quick_string_width(len)?;
        if s.len() > len || !s.is_ascii() {
            return Err(MiwaError::ArgumentInvalid(format!(
                "quick string {s:?} must be at most {len} ASCII bytes"
            )));
        }
        let mut raw = [0u8; MAX_QUICK_STRING_LEN];
        raw[..s.len()].copy_from_slice(s.as_bytes());
        self.write_bytes(&raw[..width])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> ContentWriter<W> {
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }
}
