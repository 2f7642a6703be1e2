//! EXF stream cipher: a position-keyed nibble substitution.
//!
//! Decryption is a cheap per-byte transform. Encryption has no closed form in
//! the client, so each cipher byte is found by searching the 256 candidates
//! for the one that decrypts to the wanted plaintext byte.

use tracing::debug;

use crate::error::CipherError;
use crate::keys::{EXF_KEYS, Lcg, LcgKey, select};

pub const EXF_MAGIC: [u8; 4] = *b"exf\x1a";
pub const HEADER_LEN: usize = 16;

const FORMAT: &str = "EXF";

/// Layout: [magic(4) | key index(2 LE) | reserved(6) | seed(4 LE)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExfHeader {
    pub key_index: u16,
    pub reserved: [u8; 6],
    pub seed: u32,
}

impl ExfHeader {
    pub fn new(key_index: u16, seed: u32) -> Self {
        Self {
            key_index,
            reserved: [0; 6],
            seed,
        }
    }

    /// Parses the header; `Ok(None)` when the magic is not EXF
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, CipherError> {
        if buf.len() < HEADER_LEN {
            return Err(CipherError::HeaderTooSmall {
                format: FORMAT,
                required: HEADER_LEN,
                actual: buf.len(),
            });
        }
        if buf[0..4] != EXF_MAGIC {
            return Ok(None);
        }

        let mut reserved = [0u8; 6];
        reserved.copy_from_slice(&buf[6..12]);

        Ok(Some(Self {
            key_index: u16::from_le_bytes([buf[4], buf[5]]),
            reserved,
            seed: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }))
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&EXF_MAGIC);
        out[4..6].copy_from_slice(&self.key_index.to_le_bytes());
        out[6..12].copy_from_slice(&self.reserved);
        out[12..16].copy_from_slice(&self.seed.to_le_bytes());
        out
    }
}

/// Result of [`decrypt`]
#[derive(Debug, Clone)]
pub enum ExfOutput {
    /// Header found, payload decrypted
    Decrypted { header: ExfHeader, payload: Vec<u8> },
    /// Not an EXF file; input returned untouched
    Passthrough(Vec<u8>),
}

impl ExfOutput {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ExfOutput::Decrypted { payload, .. } => payload,
            ExfOutput::Passthrough(data) => data,
        }
    }
}

fn key_for(index: u16) -> Result<LcgKey, CipherError> {
    select(&EXF_KEYS, index).ok_or(CipherError::UnknownKeyIndex {
        format: FORMAT,
        index,
        table_len: EXF_KEYS.len(),
    })
}

/// Four LCG states XOR'd with the seed, stored little endian
fn derive_key(header: &ExfHeader) -> Result<[u8; 16], CipherError> {
    let mut lcg = Lcg::new(key_for(header.key_index)?, header.seed);
    let mut key = [0u8; 16];
    for group in key.chunks_exact_mut(4) {
        let value = lcg.next_state() ^ header.seed;
        group.copy_from_slice(&value.to_le_bytes());
    }
    Ok(key)
}

/// Decrypts the byte found at payload offset `position`
#[inline]
fn decrypt_byte(key: &[u8; 16], position: u32, byte: u8) -> u8 {
    let mixed = byte as u32 ^ position;
    let position_key = key[(position & 0xF) as usize] as u32;
    let nibble_key = key[((mixed & 0xF0) >> 4) as usize] as u32;

    let high = (mixed >> 4) ^ position_key;
    let low = (nibble_key >> 4) ^ mixed;
    ((low & !0xF0) | ((high & 0xF) << 4)) as u8
}

/// Finds the cipher byte at `position` that decrypts to `target`
fn search_byte(key: &[u8; 16], position: usize, target: u8) -> Result<u8, CipherError> {
    (0..=u8::MAX)
        .find(|&candidate| decrypt_byte(key, position as u32, candidate) == target)
        .ok_or(CipherError::NoMatchFound { position, target })
}

/// Decrypt an EXF file; non-EXF input passes through unchanged
pub fn decrypt(buf: &[u8]) -> Result<ExfOutput, CipherError> {
    let Some(header) = ExfHeader::parse(buf)? else {
        debug!("no EXF magic, leaving {} bytes untouched", buf.len());
        return Ok(ExfOutput::Passthrough(buf.to_vec()));
    };
    let key = derive_key(&header)?;

    debug!(
        key_index = header.key_index,
        len = buf.len() - HEADER_LEN,
        "decrypting EXF payload"
    );

    let payload = buf[HEADER_LEN..]
        .iter()
        .enumerate()
        .map(|(pos, &b)| decrypt_byte(&key, pos as u32, b))
        .collect();

    Ok(ExfOutput::Decrypted { header, payload })
}

/// Encrypt `payload` under `header` into a complete EXF file
pub fn encrypt(payload: &[u8], header: &ExfHeader) -> Result<Vec<u8>, CipherError> {
    let key = derive_key(header)?;

    debug!(
        key_index = header.key_index,
        len = payload.len(),
        "encrypting EXF payload by search"
    );

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.to_bytes());
    for (pos, &b) in payload.iter().enumerate() {
        out.push(search_byte(&key, pos, b)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data: Vec<u8> = (0..600u32).map(|i| (i * 7 + 3) as u8).collect();

        for index in 0..EXF_KEYS.len() as u16 {
            let header = ExfHeader::new(index, 0xDEAD_BEEF ^ index as u32);
            let enc = encrypt(&data, &header).unwrap();
            assert_eq!(enc.len(), HEADER_LEN + data.len());

            match decrypt(&enc).unwrap() {
                ExfOutput::Decrypted {
                    header: parsed,
                    payload,
                } => {
                    assert_eq!(parsed, header);
                    assert_eq!(payload, data);
                }
                ExfOutput::Passthrough(_) => panic!("EXF magic not recognized"),
            }
        }
    }

    #[test]
    fn test_decrypt_is_bijective_per_position() {
        // positions only matter through their low byte
        let key = derive_key(&ExfHeader::new(4, 0x1234_5678)).unwrap();
        for position in 0..256u32 {
            let mut seen = [false; 256];
            for byte in 0..=u8::MAX {
                let out = decrypt_byte(&key, position, byte) as usize;
                assert!(!seen[out], "collision at position {position}");
                seen[out] = true;
            }
        }
    }

    #[test]
    fn test_key_derivation() {
        let header = ExfHeader::new(4, 1);
        let key = derive_key(&header).unwrap();

        let first = 0x0019660Du32.wrapping_add(3) ^ 1;
        assert_eq!(&key[0..4], &first.to_le_bytes());
    }

    #[test]
    fn test_passthrough_without_magic() {
        let data = b"JKR\x1a this is not encrypted at all".to_vec();
        match decrypt(&data).unwrap() {
            ExfOutput::Passthrough(out) => assert_eq!(out, data),
            ExfOutput::Decrypted { .. } => panic!("decrypted non-EXF input"),
        }
    }

    #[test]
    fn test_header_too_small() {
        let mut buf = EXF_MAGIC.to_vec();
        buf.resize(15, 0);
        assert!(matches!(
            decrypt(&buf).unwrap_err(),
            CipherError::HeaderTooSmall { actual: 15, .. }
        ));
    }

    #[test]
    fn test_unknown_key_index() {
        let header = ExfHeader::new(5, 0);
        assert!(matches!(
            encrypt(b"abc", &header).unwrap_err(),
            CipherError::UnknownKeyIndex { index: 5, .. }
        ));
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = ExfHeader::new(3, 0xCAFEBABE);
        header.reserved = [1, 2, 3, 4, 5, 6];
        let bytes = header.to_bytes();
        assert_eq!(ExfHeader::parse(&bytes).unwrap(), Some(header));
    }
}
