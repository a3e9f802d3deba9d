//! Compression envelope.
//!
//! A fixed 9-byte header frames a save payload for storage: 4-byte magic
//! (`LBSR` raw, `LBSC` compressed), a 1-byte algorithm id, and the u32
//! little-endian uncompressed size. Only algorithm 0 (no compression) is
//! defined; the decode path returns the payload verbatim. The header
//! exists so compressed saves can be introduced later without changing
//! the file layout.

use crate::error::SaveError;

pub const RAW_MAGIC: [u8; 4] = *b"LBSR";
pub const COMPRESSED_MAGIC: [u8; 4] = *b"LBSC";
pub const HEADER_LEN: usize = 9;

/// Envelope compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    /// Pass-through; the payload is stored verbatim.
    None,
}

impl CompressionAlgo {
    pub const fn id(self) -> u8 {
        match self {
            Self::None => 0,
        }
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            _ => None,
        }
    }

    const fn magic(self) -> [u8; 4] {
        match self {
            Self::None => RAW_MAGIC,
        }
    }
}

/// Frames `payload` with an envelope header.
pub fn wrap(payload: &[u8], algo: CompressionAlgo) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&algo.magic());
    out.push(algo.id());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    match algo {
        CompressionAlgo::None => out.extend_from_slice(payload),
    }
    out
}

/// Strips the envelope header and returns the decoded payload.
pub fn unwrap(bytes: &[u8]) -> Result<Vec<u8>, SaveError> {
    if bytes.len() < HEADER_LEN {
        return Err(SaveError::InvalidSaveFormat(
            "envelope shorter than its header".to_owned(),
        ));
    }
    let magic: [u8; 4] = bytes[..4].try_into().unwrap();
    if magic != RAW_MAGIC && magic != COMPRESSED_MAGIC {
        return Err(SaveError::InvalidMagic(magic));
    }
    let algo = CompressionAlgo::from_id(bytes[4]).ok_or_else(|| {
        SaveError::InvalidSaveFormat(format!("unknown compression algorithm id {}", bytes[4]))
    })?;
    let declared = u32::from_le_bytes(bytes[5..9].try_into().unwrap()) as usize;
    let payload = &bytes[HEADER_LEN..];

    match algo {
        CompressionAlgo::None => {
            if payload.len() != declared {
                return Err(SaveError::InvalidSaveFormat(format!(
                    "envelope declares {declared} bytes but carries {}",
                    payload.len()
                )));
            }
            Ok(payload.to_vec())
        }
    }
}

/// Whether `bytes` starts with an envelope magic.
pub fn has_header(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && (bytes[..4] == RAW_MAGIC || bytes[..4] == COMPRESSED_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let payload = b"{\"components\":{}}";
        let framed = wrap(payload, CompressionAlgo::None);
        assert_eq!(framed.len(), HEADER_LEN + payload.len());
        assert_eq!(&framed[..4], &RAW_MAGIC);
        assert_eq!(framed[4], 0);
        assert_eq!(unwrap(&framed).unwrap(), payload);
    }

    #[test]
    fn sniffs_both_magics() {
        assert!(has_header(b"LBSR\x00\x00\x00\x00\x00"));
        assert!(has_header(b"LBSC\x01\x00\x00\x00\x00"));
        assert!(!has_header(b"PNG\x0d"));
        assert!(!has_header(b"LB"));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = unwrap(b"NOPE\x00\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, SaveError::InvalidMagic(m) if &m == b"NOPE"));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut framed = wrap(b"x", CompressionAlgo::None);
        framed[4] = 7;
        assert!(unwrap(&framed).is_err());
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut framed = wrap(b"abcd", CompressionAlgo::None);
        framed.truncate(framed.len() - 1);
        assert!(unwrap(&framed).is_err());
    }
}
