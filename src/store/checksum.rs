//! Checksums
//!
//! CRC32 (IEEE) guards version snapshots; formatted as `crc32:xxxxxxxx`.
//! SHA-256 addresses blobs in the manifest change tracker and digests
//! migration folders.

use crc32fast::Hasher;
use sha2::{Digest, Sha256};

pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Format: `crc32:XXXXXXXX` (lowercase hex, zero-padded)
pub fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}

pub fn checksum_string(data: &[u8]) -> String {
    format_checksum(compute_checksum(data))
}

/// Parses `crc32:XXXXXXXX` back to u32.
pub fn parse_checksum(s: &str) -> Option<u32> {
    let hex = s.strip_prefix("crc32:")?;
    if hex.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        assert_eq!(format_checksum(0xDEADBEEF), "crc32:deadbeef");
        assert_eq!(format_checksum(0x1), "crc32:00000001");
        assert_eq!(parse_checksum("crc32:deadbeef"), Some(0xDEADBEEF));
        assert_eq!(parse_checksum("md5:deadbeef"), None);
        assert_eq!(parse_checksum("crc32:dead"), None);
    }

    #[test]
    fn test_checksum_deterministic() {
        assert_eq!(checksum_string(b"hello"), checksum_string(b"hello"));
        assert_ne!(checksum_string(b"hello"), checksum_string(b"hellO"));
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
