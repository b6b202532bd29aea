//! CRC digests used by the protocol.
//!
//! Two widths matter here: a 16-bit checksum over `"CALLSIGN-SSID"` bytes
//! for addressing, and a 32-bit checksum over the full payload for
//! end-to-end integrity. The 32-bit value travels on the wire as an
//! 8-character lowercase hex string.

use crc::{Crc, CRC_16_IBM_3740, CRC_32_ISO_HDLC};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 16-bit addressing checksum.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// 32-bit payload checksum.
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// 32-bit payload checksum rendered as 8 lowercase hex characters.
pub fn crc32_hex(bytes: &[u8]) -> String {
    format!("{:08x}", crc32(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_check_values() {
        // Catalogue check inputs for both polynomials.
        assert_eq!(crc16(b"123456789"), 0x29b1);
        assert_eq!(crc32(b"123456789"), 0xcbf43926);
    }

    #[test]
    fn hex_rendering_is_padded_lowercase() {
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
        assert_eq!(crc32_hex(b"").len(), 8);
    }

    #[test]
    fn empty_payload_digest_is_zero() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32_hex(b""), "00000000");
    }
}
