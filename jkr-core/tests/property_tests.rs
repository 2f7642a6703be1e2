//! Property tests: every encode direction must invert its decode direction
//! for arbitrary buffers.

use jkr_core::ecd::{self, HeaderTemplate};
use jkr_core::exf::{self, ExfHeader};
use jkr_core::{CompressionDescriptor, CompressionType, compress, decompress};
use proptest::prelude::*;

/// Buffers with long runs and repeated phrases, so LZ references get exercised
fn repetitive_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((any::<u8>(), 1usize..40), 0..60).prop_map(|runs| {
        let mut out = Vec::new();
        for (byte, len) in runs {
            if byte % 3 == 0 && out.len() > 8 {
                // repeat an earlier slice
                let start = byte as usize % (out.len() - 4);
                let end = (start + len).min(out.len());
                let copy = out[start..end].to_vec();
                out.extend_from_slice(&copy);
            } else {
                out.extend(std::iter::repeat_n(byte, len));
            }
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_raw_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let descriptor = CompressionDescriptor::with_default_level(CompressionType::Raw);
        let packed = compress(&descriptor, &data).unwrap();
        prop_assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn prop_lz_roundtrip(data in repetitive_strategy(), level in 0u32..9000) {
        let descriptor = CompressionDescriptor::new(CompressionType::Lz, level);
        let packed = compress(&descriptor, &data).unwrap();
        prop_assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn prop_lz_random_roundtrip(data in prop::collection::vec(any::<u8>(), 0..1500)) {
        let descriptor = CompressionDescriptor::with_default_level(CompressionType::Lz);
        let packed = compress(&descriptor, &data).unwrap();
        prop_assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn prop_huffman_roundtrip(data in repetitive_strategy(), lz in any::<bool>()) {
        let kind = if lz { CompressionType::HuffmanLz } else { CompressionType::HuffmanOnly };
        let descriptor = CompressionDescriptor::with_default_level(kind);
        let packed = compress(&descriptor, &data).unwrap();
        prop_assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn prop_ecd_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2000), index in 0u16..6) {
        let enc = ecd::encrypt(&data, HeaderTemplate::KeyIndex(index)).unwrap();
        let block = ecd::decrypt(&enc).unwrap();
        prop_assert_eq!(block.header.key_index, index);
        prop_assert_eq!(block.payload, data);
    }

    #[test]
    fn prop_exf_roundtrip(
        data in prop::collection::vec(any::<u8>(), 0..800),
        index in 0u16..5,
        seed in any::<u32>(),
    ) {
        let header = ExfHeader::new(index, seed);
        let enc = exf::encrypt(&data, &header).unwrap();
        prop_assert_eq!(exf::decrypt(&enc).unwrap().into_bytes(), data);
    }
}
