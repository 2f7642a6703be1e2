//! core functionality for the cipher and compression formats
//! of the JKR asset files
//!
//! # Modules
//!
//! - `ecd`, `exf`: the two header-tagged stream ciphers
//! - `keys`: LCG key tables driving both ciphers
//! - `header`: JKR container header and compression descriptors
//! - `raw`, `lz`, `huffman`: the compression codecs
//! - `codec`: tag dispatch, `compress`/`decompress`
//! - `asset`: layered unpack/repack of whole files

pub mod asset;
pub mod bitio;
pub mod codec;
pub mod ecd;
pub mod error;
pub mod exf;
pub mod header;
pub mod huffman;
pub mod keys;
pub mod lz;
pub mod raw;

// Re-export commonly used items
pub use asset::{AssetFormat, Layer, Unpacked, repack, unpack};
pub use codec::{compress, decompress, decompress_with_header};
pub use error::{CipherError, CodecError, Error, Result};
pub use header::{CompressionDescriptor, CompressionType, ContainerHeader, DEFAULT_LEVEL};
pub use keys::DEFAULT_KEY_INDEX;
