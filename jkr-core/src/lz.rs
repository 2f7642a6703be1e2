//! LZ77-style codec (type 3, and the inner layer of type 4).
//!
//! Control bits live in flag bytes, read MSB-first; a new flag byte is pulled
//! from the stream only when the previous one is used up, so flag bytes and
//! data bytes interleave. Token grammar:
//!
//! ```text
//! 0                          literal byte
//! 10 LL  off8                length LL+3 (3-6), offset 0-255
//! 11 hi lo                   hi>>5 != 0: length (hi>>5)+2, offset 13 bits
//! 11 hi lo 0 LLLL            length LLLL+10 (10-25)
//! 11 hi lo 1 FF              copy offset+0x1B verbatim bytes
//! 11 hi lo 1 nn              length nn+0x1A (26-280)
//! ```
//!
//! Offsets are backward distance minus one.

use crate::bitio::{ByteSink, ByteSource, RawSink, SliceSource};
use crate::codec::{Decoder, Encoder};
use crate::error::CodecError;
use crate::header::CompressionDescriptor;

const MIN_MATCH: usize = 3;
const ESCAPE: u8 = 0xFF;
const VERBATIM_BASE: usize = 0x1B;
const LONG_BASE: usize = 0x1A;

/// Copy `length` bytes starting `offset + 1` bytes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackReference {
    pub offset: usize,
    pub length: usize,
}

/// Greedy longest match for `input[pos..]`.
///
/// Candidates are scanned from the farthest allowed position forward and only
/// a strictly longer match replaces the best one, so ties go to the larger
/// distance. The match may run into the bytes it copies.
pub fn longest_match(
    input: &[u8],
    pos: usize,
    max_len: usize,
    max_distance: usize,
) -> Option<BackReference> {
    let limit = max_len.min(input.len() - pos);
    if pos == 0 || limit < MIN_MATCH {
        return None;
    }

    let target = &input[pos..pos + limit];
    let mut best = BackReference {
        offset: 0,
        length: 0,
    };

    for candidate in pos.saturating_sub(max_distance)..pos {
        let len = input[candidate..]
            .iter()
            .zip(target)
            .take_while(|(a, b)| a == b)
            .count();
        if len > best.length {
            best = BackReference {
                offset: pos - candidate - 1,
                length: len,
            };
            if len == limit {
                break;
            }
        }
    }

    (best.length >= MIN_MATCH).then_some(best)
}

/// Writes the LZ token stream through a [`ByteSink`]
pub struct LzEncoder<S: ByteSink> {
    sink: S,
    max_len: usize,
    max_distance: usize,
    flag: u8,
    flag_bits: u8,
    /// Data bytes that follow the current flag byte in the stream
    pending: Vec<u8>,
}

impl<S: ByteSink> LzEncoder<S> {
    pub fn new(sink: S, descriptor: &CompressionDescriptor) -> Self {
        Self {
            sink,
            max_len: descriptor.max_match_len(),
            max_distance: descriptor.max_distance(),
            flag: 0,
            flag_bits: 0,
            pending: Vec::with_capacity(64),
        }
    }

    pub fn encode(mut self, input: &[u8]) -> Vec<u8> {
        let mut pos = 0;
        while pos < input.len() {
            match longest_match(input, pos, self.max_len, self.max_distance) {
                Some(back_ref) => {
                    self.emit_reference(back_ref);
                    pos += back_ref.length;
                }
                None => {
                    self.push_bit(0);
                    self.pending.push(input[pos]);
                    pos += 1;
                }
            }
        }

        if self.flag_bits > 0 {
            self.flush_flag();
        }
        self.sink.finish()
    }

    fn emit_reference(&mut self, back_ref: BackReference) {
        let BackReference { offset, length } = back_ref;
        self.push_bit(1);

        if length <= 6 && offset <= 0xFF {
            self.push_bit(0);
            self.push_bits((length - 3) as u8, 2);
            self.pending.push(offset as u8);
            return;
        }

        self.push_bit(1);
        let hi = (offset >> 8) as u8;
        let lo = offset as u8;
        if length <= 9 {
            self.pending.push(hi | (((length - 2) as u8) << 5));
            self.pending.push(lo);
        } else if length <= 25 {
            self.pending.push(hi);
            self.pending.push(lo);
            self.push_bit(0);
            self.push_bits((length - 10) as u8, 4);
        } else {
            self.pending.push(hi);
            self.pending.push(lo);
            self.push_bit(1);
            self.pending.push((length - LONG_BASE) as u8);
        }
    }

    fn push_bit(&mut self, bit: u8) {
        if self.flag_bits == 8 {
            self.flush_flag();
        }
        self.flag |= bit << (7 - self.flag_bits);
        self.flag_bits += 1;
    }

    fn push_bits(&mut self, value: u8, count: u8) {
        for shift in (0..count).rev() {
            self.push_bit((value >> shift) & 1);
        }
    }

    fn flush_flag(&mut self) {
        self.sink.write_byte(self.flag);
        for byte in self.pending.drain(..) {
            self.sink.write_byte(byte);
        }
        self.flag = 0;
        self.flag_bits = 0;
    }
}

/// Rebuilds exactly `size` bytes from a token stream read through a [`ByteSource`]
pub struct LzDecoder<S: ByteSource> {
    source: S,
    flag: u8,
    remaining: u8,
    out: Vec<u8>,
    size: usize,
}

impl<S: ByteSource> LzDecoder<S> {
    pub fn new(source: S, size: usize) -> Self {
        Self {
            source,
            flag: 0,
            remaining: 0,
            out: Vec::with_capacity(size),
            size,
        }
    }

    pub fn decode(mut self) -> Result<Vec<u8>, CodecError> {
        while self.out.len() < self.size {
            if self.bit()? == 0 {
                let byte = self.byte()?;
                self.out.push(byte);
                continue;
            }

            if self.bit()? == 0 {
                let length = self.bits(2)? as usize + 3;
                let offset = self.byte()? as usize;
                self.copy(offset, length)?;
                continue;
            }

            let hi = self.byte()?;
            let lo = self.byte()?;
            let offset = (((hi & 0x1F) as usize) << 8) | lo as usize;
            let short_len = (hi >> 5) as usize;

            if short_len != 0 {
                self.copy(offset, short_len + 2)?;
            } else if self.bit()? == 0 {
                let length = self.bits(4)? as usize + 10;
                self.copy(offset, length)?;
            } else {
                let marker = self.byte()?;
                if marker == ESCAPE {
                    self.verbatim(offset + VERBATIM_BASE)?;
                } else {
                    self.copy(offset, marker as usize + LONG_BASE)?;
                }
            }
        }

        Ok(self.out)
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        let (produced, expected) = (self.out.len(), self.size);
        self.source
            .read_byte()
            .map_err(|e| e.at_output(produced, expected))
    }

    fn bit(&mut self) -> Result<u8, CodecError> {
        if self.remaining == 0 {
            self.flag = self.byte()?;
            self.remaining = 8;
        }
        self.remaining -= 1;
        Ok((self.flag >> self.remaining) & 1)
    }

    fn bits(&mut self, count: u8) -> Result<u8, CodecError> {
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | self.bit()?;
        }
        Ok(value)
    }

    fn check_room(&self, length: usize) -> Result<(), CodecError> {
        let position = self.out.len();
        if position + length > self.size {
            return Err(CodecError::OutputOverrun {
                position,
                length,
                capacity: self.size,
            });
        }
        Ok(())
    }

    /// Byte-by-byte so a source range overlapping the destination repeats
    fn copy(&mut self, offset: usize, length: usize) -> Result<(), CodecError> {
        let position = self.out.len();
        let distance = offset + 1;
        if distance > position {
            return Err(CodecError::InvalidBackReference { position, distance });
        }
        self.check_room(length)?;

        for _ in 0..length {
            let byte = self.out[self.out.len() - distance];
            self.out.push(byte);
        }
        Ok(())
    }

    fn verbatim(&mut self, count: usize) -> Result<(), CodecError> {
        self.check_room(count)?;
        for _ in 0..count {
            let byte = self.byte()?;
            self.out.push(byte);
        }
        Ok(())
    }
}

/// Plain LZ over raw bytes (type 3)
#[derive(Debug, Clone, Copy)]
pub struct LzCodec {
    descriptor: CompressionDescriptor,
}

impl LzCodec {
    pub fn new(descriptor: CompressionDescriptor) -> Self {
        Self { descriptor }
    }
}

impl Encoder for LzCodec {
    fn encode(&mut self, input: &[u8], out: Vec<u8>) -> Vec<u8> {
        LzEncoder::new(RawSink::new(out), &self.descriptor).encode(input)
    }
}

impl Decoder for LzCodec {
    fn decode(&self, payload: &[u8], base: usize, size: usize) -> Result<Vec<u8>, CodecError> {
        LzDecoder::new(SliceSource::new(payload, base), size).decode()
    }
}
