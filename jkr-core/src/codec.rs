//! Picks the codec for a compression tag and wraps payloads in the JKR container

use tracing::debug;

use crate::error::CodecError;
use crate::header::{CompressionDescriptor, CompressionType, ContainerHeader, HEADER_LEN};
use crate::huffman::{HuffmanDecoder, HuffmanEncoder, HuffmanMode};
use crate::lz::LzCodec;
use crate::raw::RawCodec;

/// Turns a whole input buffer into a payload appended to `out`.
/// Instances keep per-call state and take `&mut self`; use one per thread.
pub trait Encoder {
    fn encode(&mut self, input: &[u8], out: Vec<u8>) -> Vec<u8>;
}

/// Rebuilds `size` bytes from a payload. `base` is the payload's offset in
/// the container, used for error reports.
pub trait Decoder {
    fn decode(&self, payload: &[u8], base: usize, size: usize) -> Result<Vec<u8>, CodecError>;
}

/// Encoder for `descriptor`; RawMarker is decode-only
pub fn encoder_for(descriptor: &CompressionDescriptor) -> Result<Box<dyn Encoder>, CodecError> {
    let encoder: Box<dyn Encoder> = match descriptor.kind() {
        CompressionType::Raw => Box::new(RawCodec),
        CompressionType::RawMarker => {
            return Err(CodecError::DecodeOnly(CompressionType::RawMarker));
        }
        CompressionType::HuffmanOnly => {
            Box::new(HuffmanEncoder::new(HuffmanMode::Bytes, *descriptor))
        }
        CompressionType::Lz => Box::new(LzCodec::new(*descriptor)),
        CompressionType::HuffmanLz => Box::new(HuffmanEncoder::new(HuffmanMode::Lz, *descriptor)),
    };
    Ok(encoder)
}

/// Decoder for a raw container tag
pub fn decoder_for(tag: u16) -> Result<Box<dyn Decoder>, CodecError> {
    let kind = CompressionType::try_from(tag)?;
    let decoder: Box<dyn Decoder> = match kind {
        CompressionType::Raw | CompressionType::RawMarker => Box::new(RawCodec),
        CompressionType::HuffmanOnly => Box::new(HuffmanDecoder::new(HuffmanMode::Bytes)),
        // decoding ignores the level
        CompressionType::Lz => Box::new(LzCodec::new(
            CompressionDescriptor::with_default_level(kind),
        )),
        CompressionType::HuffmanLz => Box::new(HuffmanDecoder::new(HuffmanMode::Lz)),
    };
    Ok(decoder)
}

/// Compress `input` into a complete JKR container
pub fn compress(descriptor: &CompressionDescriptor, input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = encoder_for(descriptor)?;
    compress_with(encoder.as_mut(), descriptor.kind(), input)
}

/// Like [`compress`] with a caller-owned encoder (e.g. a seeded Huffman encoder)
pub fn compress_with(
    encoder: &mut dyn Encoder,
    kind: CompressionType,
    input: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let size = i32::try_from(input.len()).map_err(|_| CodecError::InputTooLarge(input.len()))?;

    debug!(kind = ?kind, len = input.len(), "compressing");

    let header = ContainerHeader::new(kind.tag(), HEADER_LEN as i32, size);
    let mut out = Vec::with_capacity(HEADER_LEN + input.len() / 2);
    out.extend_from_slice(&header.to_bytes());
    Ok(encoder.encode(input, out))
}

/// Decompress a complete JKR container
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = ContainerHeader::parse(data)?;
    decompress_with_header(&header, data)
}

/// Decompress `data` (the whole container) using an already parsed header
pub fn decompress_with_header(
    header: &ContainerHeader,
    data: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let decoder = decoder_for(header.compression_tag)?;

    let size = usize::try_from(header.decompressed_size).map_err(|_| {
        CodecError::InvalidHeaderField {
            field: "decompressed_size",
            value: header.decompressed_size as i64,
        }
    })?;
    let start = usize::try_from(header.start_offset)
        .ok()
        .filter(|&start| start <= data.len())
        .ok_or(CodecError::InvalidHeaderField {
            field: "start_offset",
            value: header.start_offset as i64,
        })?;

    debug!(
        tag = header.compression_tag,
        size,
        start,
        "decompressing"
    );

    decoder.decode(&data[start..], start, size)
}
