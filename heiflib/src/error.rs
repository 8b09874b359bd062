//! The error taxonomy of the public reader / writer API.
//!
//! The byte and box layers below speak `std::io::Result`; errors crossing
//! into the API layer are classified here by `io::ErrorKind`.
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong, in one place.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying stream read/write/seek failed.
    #[error("i/o error: {0}")]
    Io(io::Error),

    /// Bitstream or box ended inside a required field.
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// Syntax violation in a bitstream or box.
    #[error("malformed bitstream: {0}")]
    MalformedBitstream(String),

    /// A parameter set or box uses a feature outside the HEIF profile.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An item or sample entry type has no registered parser.
    #[error("unknown code type: {0}")]
    UnknownCodeType(String),

    /// The context id does not name a meta box or track.
    #[error("invalid context id: {0}")]
    InvalidContext(u32),

    /// Item id out of range for this context.
    #[error("invalid item id: {0}")]
    InvalidItemId(u32),

    /// Property index out of range for this context.
    #[error("invalid property index: {0}")]
    InvalidPropertyIndex(u32),

    /// Sample description index out of range.
    #[error("invalid sample description index: {0}")]
    InvalidSampleDescriptionIndex(u32),

    /// Item is protected; only raw bytes and scheme info are available.
    #[error("item {0} is protected")]
    ProtectedItem(u32),

    /// API called before `initialize`.
    #[error("reader is not initialized")]
    Uninitialized,

    /// Operation only valid for another context type.
    #[error("not applicable: {0}")]
    NotApplicable(&'static str),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof(e.to_string()),
            io::ErrorKind::InvalidData => Error::MalformedBitstream(e.to_string()),
            io::ErrorKind::Unsupported => Error::UnsupportedFeature(e.to_string()),
            _ => Error::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_classification() {
        let e: Error = ioerr!(UnexpectedEof, "short box").into();
        assert!(matches!(e, Error::UnexpectedEof(_)));
        let e: Error = ioerr!(InvalidData, "bad code").into();
        assert!(matches!(e, Error::MalformedBitstream(_)));
        let e: Error = ioerr!(NotFound, "gone").into();
        assert!(matches!(e, Error::Io(_)));
    }
}
