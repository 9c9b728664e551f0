//! Error type shared by the builder, codec and reader.

use std::io;

use thiserror::Error;

use crate::value::ValueKind;

/// Result type for map operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The encoded entry does not fit in the remaining buffer space.
    /// The map is left exactly as it was before the failed call.
    #[error("buffer full: need {needed} bytes, {available} available")]
    BufferFull { needed: usize, available: usize },

    #[error("sub-maps nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("end_sub_map called with no open sub-map")]
    NoOpenSubMap,

    #[error("{kind} of length {len} exceeds the encodable maximum of {max}")]
    ValueTooLarge {
        kind: ValueKind,
        len: usize,
        max: usize,
    },

    #[error("map already holds the maximum of {} entries", u16::MAX)]
    TooManyEntries,

    #[error("key not found: {0:?}")]
    NotFound(String),

    #[error("key {key:?} holds {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: ValueKind,
    },

    #[error("malformed data at offset {offset}: {reason}")]
    MalformedData { offset: usize, reason: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        Error::MalformedData { offset, reason }
    }
}
