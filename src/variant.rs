//! Tagged scalar values carried by content attributes.
//!
//! [`Variant`] is a closed sum type over the scalar kinds the container can
//! describe.  Its kind is fixed at construction; every conversion out of it is
//! explicit and fallible:
//!
//! | Source kind | numeric target | string target |
//! |-------------|----------------|---------------|
//! | bool / integer / float | range-checked | `InvalidCast` |
//! | string | `InvalidCast` | ok |
//! | bytes | leading bytes, big-endian | UTF-8 decode |
//!
//! [`BaseType`] is the 8-byte reinterpretation view shared by every numeric
//! width.  A value of width `w` occupies the first `w` bytes in host order, so
//! a single byte reversal over that prefix converts it to or from any
//! [`ByteOrder`] without per-type code.

use std::fmt;
use std::mem::size_of;

use crate::error::{MiwaError, Result};
use crate::stream::ByteOrder;

// ── BaseType ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BaseType {
    bytes: [u8; 8],
}

macro_rules! base_accessors {
    ($($t:ty => $from:ident, $as:ident;)*) => {
        $(
            #[inline]
            pub fn $from(v: $t) -> Self {
                let mut bytes = [0u8; 8];
                bytes[..size_of::<$t>()].copy_from_slice(&v.to_ne_bytes());
                Self { bytes }
            }

            #[inline]
            pub fn $as(&self) -> $t {
                let mut raw = [0u8; size_of::<$t>()];
                raw.copy_from_slice(&self.bytes[..size_of::<$t>()]);
                <$t>::from_ne_bytes(raw)
            }
        )*
    };
}

impl BaseType {
    base_accessors! {
        u8  => from_u8,  as_u8;
        i8  => from_i8,  as_i8;
        u16 => from_u16, as_u16;
        i16 => from_i16, as_i16;
        u32 => from_u32, as_u32;
        i32 => from_i32, as_i32;
        u64 => from_u64, as_u64;
        i64 => from_i64, as_i64;
        f32 => from_f32, as_f32;
        f64 => from_f64, as_f64;
    }

    /// Build a view from `width` bytes laid out in `order`.
    pub fn from_ordered(src: &[u8], order: ByteOrder) -> Result<Self> {
        let width = src.len();
        check_width(width)?;
        let mut base = Self::default();
        base.bytes[..width].copy_from_slice(src);
        if order.needs_swap() {
            base.swap(width);
        }
        Ok(base)
    }

    /// The first `width` bytes of the value, laid out in `order`.
    pub fn to_ordered(&self, width: usize, order: ByteOrder) -> Result<[u8; 8]> {
        check_width(width)?;
        let mut out = *self;
        if order.needs_swap() {
            out.swap(width);
        }
        Ok(out.bytes)
    }

    /// Reverse the significant prefix in place.
    #[inline]
    pub fn swap(&mut self, width: usize) {
        self.bytes[..width].reverse();
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.bytes
    }
}

fn check_width(width: usize) -> Result<()> {
    match width {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(MiwaError::ArgumentInvalid(format!("unsupported scalar width {width}"))),
    }
}

// ── Variant ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Bytes,
}

impl VariantKind {
    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Bool   => "bool",
            VariantKind::I8     => "i8",
            VariantKind::U8     => "u8",
            VariantKind::I16    => "i16",
            VariantKind::U16    => "u16",
            VariantKind::I32    => "i32",
            VariantKind::U32    => "u32",
            VariantKind::I64    => "i64",
            VariantKind::U64    => "u64",
            VariantKind::F32    => "f32",
            VariantKind::F64    => "f64",
            VariantKind::String => "string",
            VariantKind::Bytes  => "bytes",
        }
    }

    /// Storage width of the numeric kinds; `None` for string and bytes.
    pub fn width(self) -> Option<usize> {
        match self {
            VariantKind::Bool | VariantKind::I8 | VariantKind::U8 => Some(1),
            VariantKind::I16 | VariantKind::U16                  => Some(2),
            VariantKind::I32 | VariantKind::U32 | VariantKind::F32 => Some(4),
            VariantKind::I64 | VariantKind::U64 | VariantKind::F64 => Some(8),
            VariantKind::String | VariantKind::Bytes             => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.width().is_some()
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum Variant {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Intermediate for numeric narrowing.
enum Num {
    Int(i128),
    Float(f64),
}

macro_rules! int_conversion {
    ($($name:ident => $t:ty, $as:ident;)*) => {
        $(
            pub fn $name(&self) -> Result<$t> {
                let target = stringify!($t);
                match self {
                    Variant::Bytes(b) => Ok(self.leading_bytes(b, size_of::<$t>(), target)?.$as()),
                    _ => match self.numeric(target)? {
                        Num::Int(v)   => <$t>::try_from(v).map_err(|_| self.cast_error(target)),
                        Num::Float(v) => {
                            if v.is_finite() && v.fract() == 0.0
                                && v >= <$t>::MIN as f64 && v <= <$t>::MAX as f64
                            {
                                <$t>::try_from(v as i128).map_err(|_| self.cast_error(target))
                            } else {
                                Err(self.cast_error(target))
                            }
                        }
                    },
                }
            }
        )*
    };
}

impl Variant {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Bool(_)   => VariantKind::Bool,
            Variant::I8(_)     => VariantKind::I8,
            Variant::U8(_)     => VariantKind::U8,
            Variant::I16(_)    => VariantKind::I16,
            Variant::U16(_)    => VariantKind::U16,
            Variant::I32(_)    => VariantKind::I32,
            Variant::U32(_)    => VariantKind::U32,
            Variant::I64(_)    => VariantKind::I64,
            Variant::U64(_)    => VariantKind::U64,
            Variant::F32(_)    => VariantKind::F32,
            Variant::F64(_)    => VariantKind::F64,
            Variant::String(_) => VariantKind::String,
            Variant::Bytes(_)  => VariantKind::Bytes,
        }
    }

    /// The numeric payload as a [`BaseType`] view, if this is a numeric kind.
    pub fn base(&self) -> Option<BaseType> {
        Some(match *self {
            Variant::Bool(v) => BaseType::from_u8(v as u8),
            Variant::I8(v)   => BaseType::from_i8(v),
            Variant::U8(v)   => BaseType::from_u8(v),
            Variant::I16(v)  => BaseType::from_i16(v),
            Variant::U16(v)  => BaseType::from_u16(v),
            Variant::I32(v)  => BaseType::from_i32(v),
            Variant::U32(v)  => BaseType::from_u32(v),
            Variant::I64(v)  => BaseType::from_i64(v),
            Variant::U64(v)  => BaseType::from_u64(v),
            Variant::F32(v)  => BaseType::from_f32(v),
            Variant::F64(v)  => BaseType::from_f64(v),
            Variant::String(_) | Variant::Bytes(_) => return None,
        })
    }

    int_conversion! {
        to_i8  => i8,  as_i8;
        to_u8  => u8,  as_u8;
        to_i16 => i16, as_i16;
        to_u16 => u16, as_u16;
        to_i32 => i32, as_i32;
        to_u32 => u32, as_u32;
        to_i64 => i64, as_i64;
        to_u64 => u64, as_u64;
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Variant::Bool(v)  => Ok(*v),
            Variant::Bytes(b) => Ok(self.leading_bytes(b, 1, "bool")?.as_u8() != 0),
            _ => match self.numeric("bool")? {
                Num::Int(v)   => Ok(v != 0),
                Num::Float(v) => Ok(v != 0.0),
            },
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Variant::Bytes(b) => Ok(self.leading_bytes(b, 8, "f64")?.as_f64()),
            _ => match self.numeric("f64")? {
                Num::Int(v)   => Ok(v as f64),
                Num::Float(v) => Ok(v),
            },
        }
    }

    pub fn to_f32(&self) -> Result<f32> {
        match self {
            Variant::Bytes(b) => Ok(self.leading_bytes(b, 4, "f32")?.as_f32()),
            _ => match self.numeric("f32")? {
                Num::Int(v) => Ok(v as f32),
                Num::Float(v) if v.is_finite() && v.abs() > f32::MAX as f64 => {
                    Err(self.cast_error("f32"))
                }
                Num::Float(v) => Ok(v as f32),
            },
        }
    }

    /// Borrow the text of a string-kind variant.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Variant::String(s) => Ok(s),
            Variant::Bytes(b)  => std::str::from_utf8(b).map_err(|_| self.cast_error("string")),
            _ => Err(self.cast_error("string")),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        self.as_str().map(str::to_owned)
    }

    /// Borrow the raw bytes of a byte-sequence variant.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Variant::Bytes(b) => Ok(b),
            _ => Err(self.cast_error("bytes")),
        }
    }

    fn numeric(&self, target: &'static str) -> Result<Num> {
        Ok(match *self {
            Variant::Bool(v) => Num::Int(v as i128),
            Variant::I8(v)   => Num::Int(v.into()),
            Variant::U8(v)   => Num::Int(v.into()),
            Variant::I16(v)  => Num::Int(v.into()),
            Variant::U16(v)  => Num::Int(v.into()),
            Variant::I32(v)  => Num::Int(v.into()),
            Variant::U32(v)  => Num::Int(v.into()),
            Variant::I64(v)  => Num::Int(v.into()),
            Variant::U64(v)  => Num::Int(v.into()),
            Variant::F32(v)  => Num::Float(v.into()),
            Variant::F64(v)  => Num::Float(v),
            Variant::String(_) | Variant::Bytes(_) => return Err(self.cast_error(target)),
        })
    }

    fn leading_bytes(&self, bytes: &[u8], width: usize, target: &'static str) -> Result<BaseType> {
        if bytes.len() < width {
            return Err(self.cast_error(target));
        }
        BaseType::from_ordered(&bytes[..width], ByteOrder::BigEndian)
    }

    fn cast_error(&self, to: &'static str) -> MiwaError {
        MiwaError::InvalidCast { from: self.kind().name(), to }
    }
}

impl PartialEq for Variant {
    /// Same kind and same underlying bytes.
    fn eq(&self, other: &Self) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        match (self, other) {
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Bytes(a), Variant::Bytes(b))   => a == b,
            _ => self.base() == other.base(),
        }
    }
}

impl Eq for Variant {}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bool(v)   => write!(f, "{v}"),
            Variant::I8(v)     => write!(f, "{v}"),
            Variant::U8(v)     => write!(f, "{v}"),
            Variant::I16(v)    => write!(f, "{v}"),
            Variant::U16(v)    => write!(f, "{v}"),
            Variant::I32(v)    => write!(f, "{v}"),
            Variant::U32(v)    => write!(f, "{v}"),
            Variant::I64(v)    => write!(f, "{v}"),
            Variant::U64(v)    => write!(f, "{v}"),
            Variant::F32(v)    => write!(f, "{v}"),
            Variant::F64(v)    => write!(f, "{v}"),
            Variant::String(s) => write!(f, "{s:?}"),
            Variant::Bytes(b)  => f.write_str(&hex::encode(b)),
        }
    }
}

macro_rules! variant_from {
    ($($t:ty => $kind:ident, $conv:ident;)*) => {
        $(
            impl From<$t> for Variant {
                fn from(v: $t) -> Self { Variant::$kind(v) }
            }

            impl TryFrom<&Variant> for $t {
                type Error = MiwaError;
                fn try_from(v: &Variant) -> Result<Self> { v.$conv() }
            }
        )*
    };
}

variant_from! {
    bool => Bool, to_bool;
    i8   => I8,   to_i8;
    u8   => U8,   to_u8;
    i16  => I16,  to_i16;
    u16  => U16,  to_u16;
    i32  => I32,  to_i32;
    u32  => U32,  to_u32;
    i64  => I64,  to_i64;
    u64  => U64,  to_u64;
    f32  => F32,  to_f32;
    f64  => F64,  to_f64;
}

impl From<String> for Variant {
    fn from(v: String) -> Self { Variant::String(v) }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self { Variant::String(v.to_owned()) }
}

impl From<Vec<u8>> for Variant {
    fn from(v: Vec<u8>) -> Self { Variant::Bytes(v) }
}

impl TryFrom<&Variant> for String {
    type Error = MiwaError;
    fn try_from(v: &Variant) -> Result<Self> { v.to_text() }
}
