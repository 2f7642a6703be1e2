//! ECD stream cipher: CRC-seeded LCG driving a self-synchronizing nibble
//! network. Each byte depends on the previous plaintext byte, so the whole
//! payload is processed sequentially.

use tracing::{debug, warn};

use crate::error::CipherError;
use crate::keys::{DEFAULT_KEY_INDEX, ECD_KEYS, Lcg, LcgKey, select};

pub const ECD_MAGIC: [u8; 4] = *b"ecd\x1a";
pub const HEADER_LEN: usize = 16;

/// Shortest template an encrypt call accepts (magic + key index)
pub const MIN_META_LEN: usize = 6;

const FORMAT: &str = "ECD";

/// Layout: [magic(4) | key index(2 LE) | reserved(2) | payload len(4 LE) | crc32(4 LE)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdHeader {
    pub magic: [u8; 4],
    pub key_index: u16,
    pub reserved: u16,
    pub payload_len: u32,
    pub crc32: u32,
}

impl EcdHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, CipherError> {
        if buf.len() < HEADER_LEN {
            return Err(CipherError::HeaderTooSmall {
                format: FORMAT,
                required: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != ECD_MAGIC {
            return Err(CipherError::InvalidMagic {
                format: FORMAT,
                expected: ECD_MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            magic,
            key_index: u16::from_le_bytes([buf[4], buf[5]]),
            reserved: u16::from_le_bytes([buf[6], buf[7]]),
            payload_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            crc32: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.key_index.to_le_bytes());
        out[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        out[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        out[12..16].copy_from_slice(&self.crc32.to_le_bytes());
        out
    }
}

/// Where an encrypt call takes its key index (and reserved bytes) from
#[derive(Debug, Clone, Copy)]
pub enum HeaderTemplate<'a> {
    /// Header bytes from an earlier ECD decrypt, at least [`MIN_META_LEN`] long
    Meta(&'a [u8]),
    /// Bare key index, header synthesized around it
    KeyIndex(u16),
}

/// Decrypted payload plus the header it came with
#[derive(Debug, Clone)]
pub struct EcdBlock {
    pub header: EcdHeader,
    pub payload: Vec<u8>,
}

fn key_for(index: u16) -> Result<LcgKey, CipherError> {
    select(&ECD_KEYS, index).ok_or(CipherError::UnknownKeyIndex {
        format: FORMAT,
        index,
        table_len: ECD_KEYS.len(),
    })
}

/// Rotates the CRC by 16 and forces the seed odd
#[inline]
fn seed_from_crc(crc: u32) -> u32 {
    (crc << 16) | (crc >> 16) | 1
}

/// Eight rounds of the nibble network; returns `(lo, hi)`.
/// Only the low nibble of each register is significant afterwards.
#[inline]
fn mix_rounds(mut pad: u32, mut lo: u32, mut hi: u32) -> (u32, u32) {
    for _ in 0..8 {
        let mixed = pad ^ lo;
        lo = hi;
        hi = (hi ^ mixed) & 0xFF;
        pad >>= 4;
    }
    (lo, hi)
}

/// Decrypts `cipher` in place with the given key and CRC seed
fn decrypt_bytes(cipher: &mut [u8], key: LcgKey, crc: u32) {
    let mut lcg = Lcg::new(key, seed_from_crc(crc));
    let mut feedback = lcg.next_state() as u8;

    for byte in cipher.iter_mut() {
        let pad = lcg.next_state();

        let input = (*byte ^ feedback) as u32;
        let (lo, hi) = mix_rounds(pad, input, (input >> 4) & 0xFF);

        feedback = ((hi & 0xF) | ((lo & 0xF) << 4)) as u8;
        *byte = feedback;
    }
}

/// Encrypts `plain` in place; feedback chains on the previous plaintext byte
fn encrypt_bytes(plain: &mut [u8], key: LcgKey, crc: u32) {
    let mut lcg = Lcg::new(key, seed_from_crc(crc));
    let mut feedback = lcg.next_state() as u8;

    for byte in plain.iter_mut() {
        let pad = lcg.next_state();
        let (pad_lo, pad_hi) = mix_rounds(pad, 0, 0);

        let data = *byte;
        let mut low = data as u32;
        let mut high = (low >> 4) & 0xFF;
        high ^= pad_lo;
        low ^= pad_hi;
        high ^= low;

        *byte = ((low & 0xF) | ((high & 0xF) << 4)) as u8 ^ feedback;
        feedback = data;
    }
}

/// Decrypt an ECD file into its header and plaintext payload
pub fn decrypt(buf: &[u8]) -> Result<EcdBlock, CipherError> {
    let header = EcdHeader::parse(buf)?;
    let key = key_for(header.key_index)?;

    let declared = header.payload_len as usize;
    let available = buf.len() - HEADER_LEN;
    if declared > available {
        return Err(CipherError::TruncatedPayload {
            format: FORMAT,
            declared,
            available,
        });
    }

    debug!(
        key_index = header.key_index,
        len = declared,
        "decrypting ECD payload"
    );

    let mut payload = buf[HEADER_LEN..HEADER_LEN + declared].to_vec();
    decrypt_bytes(&mut payload, key, header.crc32);

    let calc = crc32fast::hash(&payload);
    if calc != header.crc32 {
        warn!(
            "ECD crc mismatch: stored=0x{:08x} calc=0x{:08x}",
            header.crc32, calc
        );
    }

    Ok(EcdBlock { header, payload })
}

/// Encrypt `payload` into a complete ECD file (header + cipher)
pub fn encrypt(payload: &[u8], template: HeaderTemplate<'_>) -> Result<Vec<u8>, CipherError> {
    let mut prefix = [0u8; 8];
    match template {
        HeaderTemplate::Meta(meta) => {
            if meta.len() < MIN_META_LEN {
                return Err(CipherError::MetaTooSmall {
                    required: MIN_META_LEN,
                    actual: meta.len(),
                });
            }
            let magic = [meta[0], meta[1], meta[2], meta[3]];
            if magic != ECD_MAGIC {
                return Err(CipherError::InvalidMagic {
                    format: FORMAT,
                    expected: ECD_MAGIC,
                    actual: magic,
                });
            }
            let n = meta.len().min(prefix.len());
            prefix[..n].copy_from_slice(&meta[..n]);
        }
        HeaderTemplate::KeyIndex(index) => {
            prefix[0..4].copy_from_slice(&ECD_MAGIC);
            prefix[4..6].copy_from_slice(&index.to_le_bytes());
        }
    }

    let header = EcdHeader {
        magic: [prefix[0], prefix[1], prefix[2], prefix[3]],
        key_index: u16::from_le_bytes([prefix[4], prefix[5]]),
        reserved: u16::from_le_bytes([prefix[6], prefix[7]]),
        payload_len: payload.len() as u32,
        crc32: crc32fast::hash(payload),
    };
    let key = key_for(header.key_index)?;

    debug!(
        key_index = header.key_index,
        len = payload.len(),
        "encrypting ECD payload"
    );

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    encrypt_bytes(&mut out[HEADER_LEN..], key, header.crc32);

    Ok(out)
}

/// Encrypt with the default key index when no saved header is at hand
pub fn encrypt_with_default_key(payload: &[u8]) -> Result<Vec<u8>, CipherError> {
    warn!(
        "no ECD header available, assuming default key index {} (unverified)",
        DEFAULT_KEY_INDEX
    );
    encrypt(payload, HeaderTemplate::KeyIndex(DEFAULT_KEY_INDEX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data = b"Hello, World! Hello, World! Hello, World!";

        for index in 0..ECD_KEYS.len() as u16 {
            let enc = encrypt(data, HeaderTemplate::KeyIndex(index)).unwrap();
            assert_eq!(enc.len(), HEADER_LEN + data.len());
            assert_ne!(&enc[HEADER_LEN..], data);

            let block = decrypt(&enc).unwrap();
            assert_eq!(block.payload, data);
            assert_eq!(block.header.key_index, index);
            assert_eq!(block.header.crc32, crc32fast::hash(data));
        }
    }

    #[test]
    fn test_header_fields_written() {
        let data = b"payload";
        let enc = encrypt(data, HeaderTemplate::KeyIndex(4)).unwrap();

        assert_eq!(&enc[0..4], &ECD_MAGIC);
        assert_eq!(u16::from_le_bytes([enc[4], enc[5]]), 4);
        assert_eq!(u32::from_le_bytes([enc[8], enc[9], enc[10], enc[11]]), 7);
        assert_eq!(
            u32::from_le_bytes([enc[12], enc[13], enc[14], enc[15]]),
            crc32fast::hash(data)
        );
    }

    #[test]
    fn test_meta_template_reused() {
        let first = encrypt(b"first", HeaderTemplate::KeyIndex(2)).unwrap();
        let mut meta = first[..HEADER_LEN].to_vec();
        meta[6] = 0xAB;

        let second = encrypt(b"second payload", HeaderTemplate::Meta(&meta)).unwrap();
        let header = EcdHeader::parse(&second).unwrap();
        assert_eq!(header.key_index, 2);
        assert_eq!(header.reserved, 0x00AB);
        assert_eq!(header.payload_len, 14);

        assert_eq!(decrypt(&second).unwrap().payload, b"second payload");
    }

    #[test]
    fn test_meta_too_small() {
        let err = encrypt(b"x", HeaderTemplate::Meta(&ECD_MAGIC[..])).unwrap_err();
        assert_eq!(
            err,
            CipherError::MetaTooSmall {
                required: 6,
                actual: 4
            }
        );
    }

    #[test]
    fn test_meta_from_other_format_rejected() {
        let mut meta = [0u8; HEADER_LEN];
        meta[0..4].copy_from_slice(b"exf\x1a");
        meta[4] = 4;
        assert_eq!(
            encrypt(b"x", HeaderTemplate::Meta(&meta)).unwrap_err(),
            CipherError::InvalidMagic {
                format: "ECD",
                expected: ECD_MAGIC,
                actual: *b"exf\x1a",
            }
        );
    }

    #[test]
    fn test_header_too_small() {
        let err = decrypt(&[0u8; 15]).unwrap_err();
        assert!(matches!(
            err,
            CipherError::HeaderTooSmall { actual: 15, .. }
        ));
    }

    #[test]
    fn test_wrong_magic() {
        let mut enc = encrypt(b"abc", HeaderTemplate::KeyIndex(4)).unwrap();
        enc[0] = b'x';
        assert!(matches!(
            decrypt(&enc).unwrap_err(),
            CipherError::InvalidMagic { .. }
        ));
    }

    #[test]
    fn test_unknown_key_index() {
        let err = encrypt(b"abc", HeaderTemplate::KeyIndex(6)).unwrap_err();
        assert!(matches!(err, CipherError::UnknownKeyIndex { index: 6, .. }));
    }

    #[test]
    fn test_truncated_payload() {
        let enc = encrypt(b"abcdef", HeaderTemplate::KeyIndex(4)).unwrap();
        let err = decrypt(&enc[..enc.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            CipherError::TruncatedPayload {
                format: "ECD",
                declared: 6,
                available: 5
            }
        );
    }

    #[test]
    fn test_crc_mismatch_still_decrypts() {
        let mut enc = encrypt(b"abcdef", HeaderTemplate::KeyIndex(4)).unwrap();
        // flip one cipher byte: feedback resynchronizes after it
        enc[HEADER_LEN + 2] ^= 0x5A;
        let block = decrypt(&enc).unwrap();
        assert_eq!(block.payload.len(), 6);
        assert_eq!(&block.payload[..2], b"ab");
        assert_ne!(block.payload, b"abcdef");
    }

    #[test]
    fn test_default_key_path() {
        let enc = encrypt_with_default_key(b"defaults").unwrap();
        let block = decrypt(&enc).unwrap();
        assert_eq!(block.header.key_index, DEFAULT_KEY_INDEX);
        assert_eq!(block.payload, b"defaults");
    }

    #[test]
    fn test_empty_payload() {
        let enc = encrypt(b"", HeaderTemplate::KeyIndex(4)).unwrap();
        assert_eq!(enc.len(), HEADER_LEN);
        assert!(decrypt(&enc).unwrap().payload.is_empty());
    }
}
