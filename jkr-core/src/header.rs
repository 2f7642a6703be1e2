//! JKR container header and compression descriptors

use crate::error::CodecError;

pub const JKR_MAGIC: [u8; 4] = *b"JKR\x1a";
pub const HEADER_LEN: usize = 16;

/// Reserved word the client writes into every container it builds
pub const RESERVED_WORD: u16 = 0x0108;

/// Compression type tags as stored in the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CompressionType {
    Raw = 0,
    /// Marks uncompressed data; only ever decoded
    RawMarker = 1,
    HuffmanOnly = 2,
    Lz = 3,
    HuffmanLz = 4,
}

impl CompressionType {
    pub fn tag(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for CompressionType {
    type Error = CodecError;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(CompressionType::Raw),
            1 => Ok(CompressionType::RawMarker),
            2 => Ok(CompressionType::HuffmanOnly),
            3 => Ok(CompressionType::Lz),
            4 => Ok(CompressionType::HuffmanLz),
            other => Err(CodecError::UnsupportedCompressionType(other)),
        }
    }
}

pub const MIN_MATCH_LEN: usize = 6;
pub const MAX_MATCH_LEN: usize = 280;
pub const MIN_DISTANCE: usize = 50;
pub const MAX_DISTANCE: usize = 0x1FFF;

/// Level used when the caller has no preference
pub const DEFAULT_LEVEL: u32 = 1000;

/// What to compress with. The level only matters for the LZ-based kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionDescriptor {
    kind: CompressionType,
    level: u32,
}

impl CompressionDescriptor {
    pub fn new(kind: CompressionType, level: u32) -> Self {
        Self { kind, level }
    }

    pub fn with_default_level(kind: CompressionType) -> Self {
        Self::new(kind, DEFAULT_LEVEL)
    }

    pub fn kind(&self) -> CompressionType {
        self.kind
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Longest match the LZ encoder may emit
    pub fn max_match_len(&self) -> usize {
        (self.level as usize).clamp(MIN_MATCH_LEN, MAX_MATCH_LEN)
    }

    /// How far back the LZ encoder may look
    pub fn max_distance(&self) -> usize {
        (self.level as usize).clamp(MIN_DISTANCE, MAX_DISTANCE)
    }
}

/// Layout: [magic(4) | reserved(2 LE) | type(2 LE) | start offset(4 LE) | size(4 LE)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub reserved: u16,
    /// Raw tag; validated when a codec is picked for it
    pub compression_tag: u16,
    pub start_offset: i32,
    pub decompressed_size: i32,
}

impl ContainerHeader {
    pub fn new(compression_tag: u16, start_offset: i32, decompressed_size: i32) -> Self {
        Self {
            reserved: RESERVED_WORD,
            compression_tag,
            start_offset,
            decompressed_size,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::TruncatedHeader {
                required: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != JKR_MAGIC {
            return Err(CodecError::InvalidMagic {
                expected: JKR_MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            reserved: u16::from_le_bytes([buf[4], buf[5]]),
            compression_tag: u16::from_le_bytes([buf[6], buf[7]]),
            start_offset: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            decompressed_size: i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&JKR_MAGIC);
        out[4..6].copy_from_slice(&self.reserved.to_le_bytes());
        out[6..8].copy_from_slice(&self.compression_tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.start_offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.decompressed_size.to_le_bytes());
        out
    }

    pub fn compression_type(&self) -> Result<CompressionType, CodecError> {
        CompressionType::try_from(self.compression_tag)
    }
}
