//! Layered asset handling: peel cipher and container layers off a file and
//! put them back in the same order.

use tracing::debug;

use crate::codec::{compress, decompress_with_header};
use crate::ecd::{self, ECD_MAGIC, EcdHeader, HeaderTemplate};
use crate::error::{Error, Result};
use crate::exf::{self, EXF_MAGIC, ExfHeader, ExfOutput};
use crate::header::{CompressionDescriptor, CompressionType, ContainerHeader, JKR_MAGIC};

/// Deepest nesting `unpack` follows before giving up
pub const MAX_LAYERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Ecd,
    Exf,
    Jkr,
    Plain,
}

impl AssetFormat {
    pub fn detect(data: &[u8]) -> Self {
        match data.get(..4) {
            Some(magic) if magic == ECD_MAGIC => AssetFormat::Ecd,
            Some(magic) if magic == EXF_MAGIC => AssetFormat::Exf,
            Some(magic) if magic == JKR_MAGIC => AssetFormat::Jkr,
            _ => AssetFormat::Plain,
        }
    }
}

/// Header of one layer removed by [`unpack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ecd(EcdHeader),
    Exf(ExfHeader),
    Jkr(ContainerHeader),
}

#[derive(Debug, Clone)]
pub struct Unpacked {
    pub data: Vec<u8>,
    /// Outermost first
    pub layers: Vec<Layer>,
}

/// Strip layers until the data no longer starts with a known magic.
///
/// Every decrypted or decompressed payload is checked for a magic again, container
/// payloads included. Plain asset bytes that begin with `ecd\x1A`,
/// `exf\x1A` or `JKR\x1A` are therefore read as one more layer and fail
/// to parse. Callers holding such data should use `ecd`, `exf` and
/// `codec` directly.
pub fn unpack(data: &[u8]) -> Result<Unpacked> {
    let mut current = data.to_vec();
    let mut layers = Vec::new();

    loop {
        let format = AssetFormat::detect(&current);
        if format != AssetFormat::Plain {
            if layers.len() == MAX_LAYERS {
                return Err(Error::TooManyLayers { max: MAX_LAYERS });
            }
            debug!(?format, depth = layers.len(), len = current.len(), "unpacking layer");
        }

        match format {
            AssetFormat::Plain => break,
            AssetFormat::Ecd => {
                let block = ecd::decrypt(&current)?;
                layers.push(Layer::Ecd(block.header));
                current = block.payload;
            }
            AssetFormat::Exf => match exf::decrypt(&current)? {
                ExfOutput::Decrypted { header, payload } => {
                    layers.push(Layer::Exf(header));
                    current = payload;
                }
                ExfOutput::Passthrough(_) => break,
            },
            AssetFormat::Jkr => {
                let header = ContainerHeader::parse(&current)?;
                current = decompress_with_header(&header, &current)?;
                layers.push(Layer::Jkr(header));
            }
        }
    }

    Ok(Unpacked {
        data: current,
        layers,
    })
}

/// Re-apply `layers` (outermost first, as `unpack` returns them) around `data`.
/// Container layers recompress at `level`; RawMarker containers come back as Raw.
pub fn repack(data: &[u8], layers: &[Layer], level: u32) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for layer in layers.iter().rev() {
        current = match layer {
            Layer::Jkr(header) => {
                let kind = match header.compression_type()? {
                    CompressionType::RawMarker => CompressionType::Raw,
                    kind => kind,
                };
                compress(&CompressionDescriptor::new(kind, level), &current)?
            }
            Layer::Ecd(header) => {
                let meta = header.to_bytes();
                ecd::encrypt(&current, HeaderTemplate::Meta(&meta))?
            }
            Layer::Exf(header) => exf::encrypt(&current, header)?,
        };
    }

    Ok(current)
}
