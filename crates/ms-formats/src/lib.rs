//! Format parsers for the modsound engine.
//!
//! Parses Scream Tracker 3 (S3M) modules into the song IR.

mod reader;
mod s3m;

pub use s3m::load_s3m;

/// Error type for format parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The `0x1A` marker or the `SCRM` tag did not match
    #[error("invalid module signature")]
    InvalidSignature,
    /// A PCM instrument record lacks its `SCRS` tag
    #[error("instrument {0}: invalid sample signature")]
    InvalidSampleSignature(usize),
    /// Instrument type other than empty or PCM (e.g. OPL/AdLib)
    #[error("instrument {index}: unsupported instrument type {kind}")]
    UnsupportedInstrument { index: usize, kind: u8 },
    /// A paragraph pointer points outside the file
    #[error("pointer 0x{0:08X} is outside the file")]
    InvalidPointer(usize),
    /// Initial tempo or speed of zero
    #[error("invalid initial timing: speed {speed}, tempo {tempo}")]
    InvalidTempo { speed: u8, tempo: u8 },
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Any other structural decoding failure
    #[error("malformed module: {0}")]
    Binary(String),
}

impl From<binrw::Error> for FormatError {
    fn from(err: binrw::Error) -> Self {
        if err.is_eof() {
            FormatError::UnexpectedEof
        } else {
            FormatError::Binary(err.to_string())
        }
    }
}
