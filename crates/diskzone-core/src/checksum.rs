//! CRC32 helpers for GPT integrity checks
//!
//! GPT uses the reflected IEEE 802.3 CRC32 (polynomial `0xEDB88320`, seed
//! `0xFFFFFFFF`, final XOR `0xFFFFFFFF`), which is exactly what `crc32fast`
//! computes.

use std::ops::Range;

/// Compute the CRC32 of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute the CRC32 of `data` as if the bytes in `field` were all zero
///
/// The stored checksum of a GPT header lives inside the bytes it covers, so
/// the header CRC is defined over the header with that field zeroed. The
/// buffer itself is left untouched.
pub fn crc32_with_zeroed_field(data: &[u8], field: Range<usize>) -> u32 {
    let start = field.start.min(data.len());
    let end = field.end.clamp(start, data.len());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..start]);
    for _ in start..end {
        hasher.update(&[0]);
    }
    hasher.update(&data[end..]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        // Standard check value for CRC-32/ISO-HDLC
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_zeroed_field_matches_manual_zeroing() {
        let mut data: Vec<u8> = (0..92u8).collect();
        let expected = {
            let mut copy = data.clone();
            copy[16..20].fill(0);
            crc32(&copy)
        };

        assert_eq!(crc32_with_zeroed_field(&data, 16..20), expected);

        // The stored value inside the field must not influence the result
        data[16..20].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(crc32_with_zeroed_field(&data, 16..20), expected);
    }

    #[test]
    fn test_zeroed_field_clamped_to_buffer() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(crc32_with_zeroed_field(&data, 2..10), crc32(&[1, 2, 0, 0]));
        assert_eq!(crc32_with_zeroed_field(&data, 8..10), crc32(&data));
    }
}
