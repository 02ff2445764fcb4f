//! Error taxonomy shared by every layer of the codec.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiwaError {
    /// Malformed or unsupported stream content: bad chunk ids, unknown block
    /// types, truncated audio headers. Always fatal for the current call.
    #[error("Invalid content: {0}")]
    InvalidContent(String),
    /// Fewer bytes were available than a read required.
    #[error("Unexpected end of stream")]
    EndOfStream,
    #[error("Argument out of range: {name} = {value} (allowed {min}..={max})")]
    ArgumentOutOfRange {
        name:  &'static str,
        value: i64,
        min:   i64,
        max:   i64,
    },
    #[error("Invalid argument: {0}")]
    ArgumentInvalid(String),
    #[error("Invalid cast from {from} to {to}")]
    InvalidCast { from: &'static str, to: &'static str },
    #[error("Object has been closed")]
    Disposed,
    /// The external image collaborator refused a frame.
    #[error("Image error: {0}")]
    Image(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for MiwaError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            MiwaError::EndOfStream
        } else {
            MiwaError::Io(e)
        }
    }
}

impl MiwaError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MiwaError::InvalidContent(msg.into())
    }

    pub(crate) fn out_of_range(name: &'static str, value: i64, min: i64, max: i64) -> Self {
        MiwaError::ArgumentOutOfRange { name, value, min, max }
    }
}

pub type Result<T> = std::result::Result<T, MiwaError>;
