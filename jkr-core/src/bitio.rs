//! Byte and bit plumbing shared by the codecs.
//!
//! [`ByteSource`] and [`ByteSink`] are the seams the LZ codec reads and writes
//! through. The raw implementations move bytes verbatim; the Huffman ones in
//! [`crate::huffman`] pack every byte into a bit code instead.
//!
//! Bits are MSB-first in both directions. The writer pads its final partial
//! byte with zeros; the reader never needs to know where the padding starts
//! because decoders stop at the declared output size.

use crate::error::CodecError;

/// Supplies the bytes a decoder consumes
pub trait ByteSource {
    fn read_byte(&mut self) -> Result<u8, CodecError>;
}

/// Receives the bytes an encoder produces
pub trait ByteSink {
    fn write_byte(&mut self, byte: u8);

    /// Flushes pending state and hands back the output buffer
    fn finish(self) -> Vec<u8>;
}

/// Reads bytes straight out of a slice. Running dry is `UnexpectedEof`.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data[0]` inside the buffer the caller handed us
    base: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }
}

impl ByteSource for SliceSource<'_> {
    #[inline]
    fn read_byte(&mut self) -> Result<u8, CodecError> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof {
            offset: self.base + self.pos,
            produced: 0,
            expected: 0,
        })?;
        self.pos += 1;
        Ok(byte)
    }
}

/// Appends bytes to a buffer unchanged
#[derive(Debug, Default)]
pub struct RawSink {
    out: Vec<u8>,
}

impl RawSink {
    /// Continue writing after whatever `out` already holds (e.g. a header)
    pub fn new(out: Vec<u8>) -> Self {
        Self { out }
    }
}

impl ByteSink for RawSink {
    #[inline]
    fn write_byte(&mut self, byte: u8) {
        self.out.push(byte);
    }

    fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Reads single bits MSB-first from a slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the next byte to load
    pos: usize,
    current: u8,
    /// Bits of `current` not yet consumed (0-8)
    remaining: u8,
    base: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            pos: 0,
            current: 0,
            remaining: 0,
            base,
        }
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<u8, CodecError> {
        if self.remaining == 0 {
            self.current = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof {
                offset: self.base + self.pos,
                produced: 0,
                expected: 0,
            })?;
            self.pos += 1;
            self.remaining = 8;
        }
        self.remaining -= 1;
        Ok((self.current >> self.remaining) & 1)
    }
}

/// Writes bits MSB-first, zero-padding the final byte on `finish`.
///
/// # Invariants
/// - `count` is always < 8 between calls
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    acc: u8,
    count: u8,
}

impl BitWriter {
    /// Continue writing after whatever `out` already holds
    pub fn new(out: Vec<u8>) -> Self {
        Self {
            out,
            acc: 0,
            count: 0,
        }
    }

    /// Write the low `len` bits of `value`, highest first
    pub fn write_bits(&mut self, value: u32, len: u8) {
        for shift in (0..len).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.acc |= bit << (7 - self.count);
            self.count += 1;
            if self.count == 8 {
                self.out.push(self.acc);
                self.acc = 0;
                self.count = 0;
            }
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.out.push(self.acc);
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_roundtrip() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(0b101, 3);
        writer.write_bits(0b11, 2);
        let bytes = writer.finish();
        assert_eq!(bytes, vec![0b1011_1000]);

        let mut reader = BitReader::new(&bytes, 0);
        let bits: Vec<u8> = (0..8).map(|_| reader.read_bit().unwrap()).collect();
        assert_eq!(bits, vec![1, 0, 1, 1, 1, 0, 0, 0]);
        assert!(matches!(
            reader.read_bit().unwrap_err(),
            CodecError::UnexpectedEof { offset: 1, .. }
        ));
    }

    #[test]
    fn test_writer_keeps_prefix() {
        let mut writer = BitWriter::new(vec![0xAA]);
        writer.write_bits(0xFF, 8);
        writer.write_bits(1, 1);
        assert_eq!(writer.finish(), vec![0xAA, 0xFF, 0x80]);
    }

    #[test]
    fn test_slice_source_reports_offset() {
        let mut src = SliceSource::new(&[1, 2], 16);
        assert_eq!(src.read_byte().unwrap(), 1);
        assert_eq!(src.read_byte().unwrap(), 2);
        assert!(matches!(
            src.read_byte().unwrap_err(),
            CodecError::UnexpectedEof { offset: 18, .. }
        ));
    }
}
