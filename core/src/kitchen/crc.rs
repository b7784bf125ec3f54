//! The CRC-32 variant used by the bootloader settings page and app image:
//! IEEE 802.3, poly `0xEDB88320` (reflected), init `0xFFFFFFFF`, final XOR
//! `0xFFFFFFFF` — `CRC_32_ISO_HDLC` in `crcxx`'s catalog.

use crcxx::crc32::catalog::CRC_32_ISO_HDLC as CRC_ALGORITHM;
use crcxx::crc32::{Crc, LookupTable256};

const CRC32: Crc<LookupTable256> = Crc::<LookupTable256>::new(&CRC_ALGORITHM);

/// Computes the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.compute(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_well_known_check_value() {
        // The standard CRC-32 (IEEE 802.3) check value for the ASCII string
        // "123456789" is 0xCBF43926.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc32(&[]), 0);
    }
}
