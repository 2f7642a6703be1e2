//! Error types for the cipher and codec layers.
//!
//! Every failure is deterministic: retrying with the same input never helps,
//! so variants carry enough context (format, offset, values) for a caller to
//! log the file and move on with a batch.

use thiserror::Error;

use crate::header::CompressionType;

/// Errors raised by the ECD and EXF stream ciphers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Buffer cannot hold the fixed 16-byte cipher header
    #[error("{format} header too small: need at least {required} bytes, got {actual}")]
    HeaderTooSmall {
        format: &'static str,
        required: usize,
        actual: usize,
    },

    /// Buffer does not start with the expected cipher magic
    #[error("invalid {format} magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic {
        format: &'static str,
        expected: [u8; 4],
        actual: [u8; 4],
    },

    /// Header template passed to an encrypt call is too short to hold a key index
    #[error("meta header too small: need at least {required} bytes, got {actual}")]
    MetaTooSmall { required: usize, actual: usize },

    /// Key index selects no entry of the LCG key table
    #[error("{format} key index {index} out of range (table has {table_len} entries)")]
    UnknownKeyIndex {
        format: &'static str,
        index: u16,
        table_len: usize,
    },

    /// Header declares more payload than the buffer holds
    #[error("{format} payload truncated: header declares {declared} bytes, {available} available")]
    TruncatedPayload {
        format: &'static str,
        declared: usize,
        available: usize,
    },

    /// EXF inverse search found no candidate byte; the decrypt transform is not a bijection here
    #[error("EXF encrypt search exhausted at payload offset {position} (target byte {target:#04x})")]
    NoMatchFound { position: usize, target: u8 },
}

/// Errors raised by the JKR container and its compression codecs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer cannot hold the fixed 16-byte container header
    #[error("container header truncated: need {required} bytes, got {actual}")]
    TruncatedHeader { required: usize, actual: usize },

    /// Buffer does not start with `JKR\x1A`
    #[error("invalid container magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Tag outside the known compression types
    #[error("unsupported compression type {0}")]
    UnsupportedCompressionType(u16),

    /// Known tag that only exists on the decode side
    #[error("compression type {0:?} is decode-only")]
    DecodeOnly(CompressionType),

    /// Compressed stream ended before the declared size was produced
    #[error("unexpected end of stream at byte {offset} ({produced} of {expected} bytes produced)")]
    UnexpectedEof {
        offset: usize,
        produced: usize,
        expected: usize,
    },

    /// Back-reference reaches before the start of the output
    #[error("back-reference at output {position} reaches {distance} bytes back")]
    InvalidBackReference { position: usize, distance: usize },

    /// Token would write past the declared decompressed size
    #[error("token at output {position} writes {length} bytes past declared size {capacity}")]
    OutputOverrun {
        position: usize,
        length: usize,
        capacity: usize,
    },

    /// Huffman table block is malformed
    #[error("invalid huffman table: {0}")]
    InvalidHuffmanTable(String),

    /// Container header field holds a value the decoder cannot honour
    #[error("invalid container header field {field}: {value}")]
    InvalidHeaderField { field: &'static str, value: i64 },

    /// Input cannot be described by the i32 size field
    #[error("input of {0} bytes exceeds the container size field")]
    InputTooLarge(usize),
}

impl CodecError {
    /// Fills in decoder progress on an `UnexpectedEof` raised by a byte source
    pub(crate) fn at_output(self, produced: usize, expected: usize) -> Self {
        match self {
            CodecError::UnexpectedEof { offset, .. } => CodecError::UnexpectedEof {
                offset,
                produced,
                expected,
            },
            other => other,
        }
    }
}

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Layered unpack kept finding wrapped formats
    #[error("asset nests more than {max} layers")]
    TooManyLayers { max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
