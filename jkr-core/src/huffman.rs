//! Huffman bit-packing (type 2 over raw bytes, type 4 over the LZ stream).
//!
//! The tree shape never changes: entries `256..510` are the identity and the
//! children of node `k` sit at `2*(k-256)` and `2*(k-256)+1`, which makes it a
//! perfect tree of depth 8 under root 510. Only the leaf assignment in
//! entries `0..256` is random, drawn fresh for every encode. The table is
//! written ahead of the payload, so decoding never needs the seed.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::bitio::{BitReader, BitWriter, ByteSink, ByteSource};
use crate::codec::{Decoder, Encoder};
use crate::error::CodecError;
use crate::header::CompressionDescriptor;
use crate::lz::{LzDecoder, LzEncoder};

/// Root index of every table the client writes (also its entry count)
pub const TABLE_ROOT: u16 = 0x1FE;

const LEAF_COUNT: usize = 256;
const MAX_DEPTH: u8 = 30;

/// Flat tree: entry values below 256 are leaves, the rest name internal nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    root: u16,
    entries: Vec<i16>,
}

impl HuffmanTable {
    /// Fixed tree shape with a uniformly shuffled leaf region
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut entries: Vec<i16> = (0..TABLE_ROOT as i16).collect();
        entries[..LEAF_COUNT].shuffle(rng);
        Self {
            root: TABLE_ROOT,
            entries,
        }
    }

    pub fn entries(&self) -> &[i16] {
        &self.entries
    }

    /// Serialized size: root index plus entries, all i16
    pub fn encoded_len(&self) -> usize {
        2 + self.entries.len() * 2
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.root as i16).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.to_le_bytes());
        }
    }

    /// Parse a table block at the start of `buf`; `base` is its offset for error reports
    pub fn parse(buf: &[u8], base: usize) -> Result<Self, CodecError> {
        let eof = |offset: usize| CodecError::UnexpectedEof {
            offset: base + offset,
            produced: 0,
            expected: 0,
        };

        if buf.len() < 2 {
            return Err(eof(buf.len()));
        }
        let root = i16::from_le_bytes([buf[0], buf[1]]);
        if root < LEAF_COUNT as i16 {
            return Err(CodecError::InvalidHuffmanTable(format!(
                "root index {root} is not an internal node"
            )));
        }

        // the root's two children are the last entries
        let count = 2 * (root as usize - LEAF_COUNT) + 2;
        let end = 2 + count * 2;
        if buf.len() < end {
            return Err(eof(buf.len()));
        }

        let entries = buf[2..end]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self {
            root: root as u16,
            entries,
        })
    }

    fn child(&self, node: u16, bit: u8) -> Result<u16, CodecError> {
        let index = 2 * (node as usize - LEAF_COUNT) + bit as usize;
        match self.entries.get(index) {
            Some(&value) if value >= 0 => Ok(value as u16),
            Some(&value) => Err(CodecError::InvalidHuffmanTable(format!(
                "entry {index} holds negative node {value}"
            ))),
            None => Err(CodecError::InvalidHuffmanTable(format!(
                "node {node} points past the {} entries",
                self.entries.len()
            ))),
        }
    }

    /// Bit path of every leaf, found by walking the tree from the root
    pub fn code_book(&self) -> CodeBook {
        let mut book = CodeBook {
            paths: [0; LEAF_COUNT],
            lengths: [0; LEAF_COUNT],
        };
        self.walk(self.root, 0, 0, &mut book);
        book
    }

    fn walk(&self, node: u16, depth: u8, path: u32, book: &mut CodeBook) {
        if depth >= MAX_DEPTH {
            return;
        }
        if (node as usize) < LEAF_COUNT {
            book.paths[node as usize] = path;
            book.lengths[node as usize] = depth;
            return;
        }
        for bit in 0..2u8 {
            if let Ok(child) = self.child(node, bit) {
                self.walk(child, depth + 1, (path << 1) | bit as u32, book);
            }
        }
    }
}

/// Per-byte code, MSB-first
#[derive(Debug, Clone)]
pub struct CodeBook {
    paths: [u32; LEAF_COUNT],
    lengths: [u8; LEAF_COUNT],
}

impl CodeBook {
    pub fn code(&self, byte: u8) -> (u32, u8) {
        (self.paths[byte as usize], self.lengths[byte as usize])
    }
}

/// Packs every byte it receives into its Huffman code
pub struct HuffmanSink {
    book: CodeBook,
    bits: BitWriter,
}

impl HuffmanSink {
    pub fn new(table: &HuffmanTable, out: Vec<u8>) -> Self {
        Self {
            book: table.code_book(),
            bits: BitWriter::new(out),
        }
    }
}

impl ByteSink for HuffmanSink {
    fn write_byte(&mut self, byte: u8) {
        let (path, len) = self.book.code(byte);
        debug_assert!(len > 0, "byte {byte:#04x} has no code");
        self.bits.write_bits(path, len);
    }

    fn finish(self) -> Vec<u8> {
        self.bits.finish()
    }
}

/// Decodes one byte per tree walk, one bit per step
pub struct HuffmanSource<'a> {
    table: &'a HuffmanTable,
    bits: BitReader<'a>,
}

impl<'a> HuffmanSource<'a> {
    pub fn new(table: &'a HuffmanTable, data: &'a [u8], base: usize) -> Self {
        Self {
            table,
            bits: BitReader::new(data, base),
        }
    }
}

impl ByteSource for HuffmanSource<'_> {
    fn read_byte(&mut self) -> Result<u8, CodecError> {
        let mut node = self.table.root;
        while node as usize >= LEAF_COUNT {
            let bit = self.bits.read_bit()?;
            node = self.table.child(node, bit)?;
        }
        Ok(node as u8)
    }
}

/// Whether the Huffman layer wraps raw bytes or the LZ stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanMode {
    Bytes,
    Lz,
}

/// Huffman encoder drawing a new table from its own RNG on every call.
/// Not for sharing between threads; give each worker its own.
pub struct HuffmanEncoder {
    mode: HuffmanMode,
    descriptor: CompressionDescriptor,
    rng: ChaCha8Rng,
}

impl HuffmanEncoder {
    pub fn new(mode: HuffmanMode, descriptor: CompressionDescriptor) -> Self {
        Self::with_rng(mode, descriptor, ChaCha8Rng::from_entropy())
    }

    /// Reproducible tables, for tests and diffable output
    pub fn with_seed(mode: HuffmanMode, descriptor: CompressionDescriptor, seed: u64) -> Self {
        Self::with_rng(mode, descriptor, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(mode: HuffmanMode, descriptor: CompressionDescriptor, rng: ChaCha8Rng) -> Self {
        Self {
            mode,
            descriptor,
            rng,
        }
    }
}

impl Encoder for HuffmanEncoder {
    fn encode(&mut self, input: &[u8], mut out: Vec<u8>) -> Vec<u8> {
        let table = HuffmanTable::random(&mut self.rng);
        table.write(&mut out);
        let sink = HuffmanSink::new(&table, out);

        debug!(mode = ?self.mode, len = input.len(), "huffman encode");
        match self.mode {
            HuffmanMode::Bytes => {
                let mut sink = sink;
                for &byte in input {
                    sink.write_byte(byte);
                }
                sink.finish()
            }
            HuffmanMode::Lz => LzEncoder::new(sink, &self.descriptor).encode(input),
        }
    }
}

/// Reads the table block, then the bit payload behind it
#[derive(Debug, Clone, Copy)]
pub struct HuffmanDecoder {
    mode: HuffmanMode,
}

impl HuffmanDecoder {
    pub fn new(mode: HuffmanMode) -> Self {
        Self { mode }
    }
}

impl Decoder for HuffmanDecoder {
    fn decode(&self, payload: &[u8], base: usize, size: usize) -> Result<Vec<u8>, CodecError> {
        let table = HuffmanTable::parse(payload, base).map_err(|e| e.at_output(0, size))?;
        let used = table.encoded_len();
        let source = HuffmanSource::new(&table, &payload[used..], base + used);

        match self.mode {
            HuffmanMode::Bytes => {
                let mut source = source;
                let mut out = Vec::with_capacity(size);
                while out.len() < size {
                    let byte = source
                        .read_byte()
                        .map_err(|e| e.at_output(out.len(), size))?;
                    out.push(byte);
                }
                Ok(out)
            }
            HuffmanMode::Lz => LzDecoder::new(source, size).decode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::CompressionType;

    fn seeded(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_leaves_are_permutation() {
        let mut rng = seeded(7);
        for _ in 0..20 {
            let table = HuffmanTable::random(&mut rng);
            let mut leaves: Vec<i16> = table.entries()[..256].to_vec();
            leaves.sort_unstable();
            assert_eq!(leaves, (0..256).collect::<Vec<i16>>());

            let internal: Vec<i16> = table.entries()[256..].to_vec();
            assert_eq!(internal, (256..510).collect::<Vec<i16>>());
        }
    }

    #[test]
    fn test_code_book_is_prefix_free_depth_8() {
        let table = HuffmanTable::random(&mut seeded(1));
        let book = table.code_book();

        let mut seen = [false; 256];
        for byte in 0..=255u8 {
            let (path, len) = book.code(byte);
            assert_eq!(len, 8);
            assert!(!seen[path as usize]);
            seen[path as usize] = true;
        }
    }

    #[test]
    fn test_code_matches_table_position() {
        let table = HuffmanTable::random(&mut seeded(2));
        let book = table.code_book();
        for (slot, &leaf) in table.entries()[..256].iter().enumerate() {
            let (path, _) = book.code(leaf as u8);
            assert_eq!(path as usize, slot);
        }
    }

    #[test]
    fn test_table_block_roundtrip() {
        let table = HuffmanTable::random(&mut seeded(3));
        let mut out = Vec::new();
        table.write(&mut out);
        assert_eq!(out.len(), 2 + 510 * 2);
        assert_eq!(&out[..2], &[0xFE, 0x01]);
        assert_eq!(HuffmanTable::parse(&out, 0).unwrap(), table);
    }

    #[test]
    fn test_truncated_table() {
        let table = HuffmanTable::random(&mut seeded(4));
        let mut out = Vec::new();
        table.write(&mut out);
        assert!(matches!(
            HuffmanTable::parse(&out[..100], 16).unwrap_err(),
            CodecError::UnexpectedEof { offset: 116, .. }
        ));
    }

    #[test]
    fn test_bad_root() {
        let out = 12i16.to_le_bytes();
        assert!(matches!(
            HuffmanTable::parse(&out, 0).unwrap_err(),
            CodecError::InvalidHuffmanTable(_)
        ));
    }

    #[test]
    fn test_same_input_differs_but_decodes() {
        let input = b"abracadabra abracadabra abracadabra".repeat(3);
        let descriptor = CompressionDescriptor::with_default_level(CompressionType::HuffmanLz);

        for mode in [HuffmanMode::Bytes, HuffmanMode::Lz] {
            let mut encoder = HuffmanEncoder::with_seed(mode, descriptor, 99);
            let first = encoder.encode(&input, Vec::new());
            let second = encoder.encode(&input, Vec::new());
            assert_ne!(first, second, "{mode:?} reused its table");

            let decoder = HuffmanDecoder::new(mode);
            assert_eq!(decoder.decode(&first, 0, input.len()).unwrap(), input);
            assert_eq!(decoder.decode(&second, 0, input.len()).unwrap(), input);
        }
    }

    #[test]
    fn test_bytes_mode_payload_size() {
        let input = b"0123456789";
        let descriptor = CompressionDescriptor::with_default_level(CompressionType::HuffmanOnly);
        let mut encoder = HuffmanEncoder::with_seed(HuffmanMode::Bytes, descriptor, 5);
        let out = encoder.encode(input, Vec::new());
        // every byte takes exactly 8 bits
        assert_eq!(out.len(), 1022 + input.len());
    }

    #[test]
    fn test_truncated_payload() {
        let input = vec![0x41u8; 64];
        let descriptor = CompressionDescriptor::with_default_level(CompressionType::HuffmanOnly);
        let mut encoder = HuffmanEncoder::with_seed(HuffmanMode::Bytes, descriptor, 6);
        let out = encoder.encode(&input, Vec::new());

        let err = HuffmanDecoder::new(HuffmanMode::Bytes)
            .decode(&out[..out.len() - 4], 0, input.len())
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnexpectedEof {
                offset: out.len() - 4,
                produced: 60,
                expected: 64
            }
        );
    }
}
