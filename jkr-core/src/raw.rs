//! Uncompressed payloads (types 0 and 1)

use tracing::warn;

use crate::codec::{Decoder, Encoder};
use crate::error::CodecError;

/// Copy `input` after whatever `out` already holds
pub fn encode(input: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(input);
}

/// Copy up to `size` bytes; a short source ends the copy early
pub fn decode(payload: &[u8], size: usize) -> Vec<u8> {
    if payload.len() < size {
        warn!(
            "raw payload holds {} of {} declared bytes, stopping early",
            payload.len(),
            size
        );
    }
    payload[..payload.len().min(size)].to_vec()
}

/// Identity codec behind tags 0 and 1
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Encoder for RawCodec {
    fn encode(&mut self, input: &[u8], mut out: Vec<u8>) -> Vec<u8> {
        encode(input, &mut out);
        out
    }
}

impl Decoder for RawCodec {
    fn decode(&self, payload: &[u8], _base: usize, size: usize) -> Result<Vec<u8>, CodecError> {
        Ok(decode(payload, size))
    }
}
