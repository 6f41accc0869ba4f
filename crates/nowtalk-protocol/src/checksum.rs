//! 16-bit integrity code used to sign pairing offers.
//!
//! CRC-16 with the reflected polynomial `0xA001` and an initial value of
//! `0xFFFF` (the Modbus variant). The badge recomputes it over the salted
//! offer text and refuses offers that do not match.

/// Initial accumulator value.
const CRC_INIT: u16 = 0xFFFF;

/// Reflected polynomial applied when the low bit shifts out set.
const CRC_POLY: u16 = 0xA001;

/// Compute the checksum of `bytes`.
///
/// # Example
///
/// ```
/// use nowtalk_protocol::checksum;
///
/// assert_eq!(checksum(b""), 0xFFFF);
/// assert_eq!(checksum(b"123456789"), 0x4B37);
/// ```
#[must_use]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(CRC_INIT, |crc, &byte| {
        let mut crc = crc ^ u16::from(byte);
        for _ in 0..8 {
            let odd = crc & 0x0001 != 0;
            crc >>= 1;
            if odd {
                crc ^= CRC_POLY;
            }
        }
        crc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_returns_init() {
        assert_eq!(checksum(&[]), CRC_INIT);
    }

    #[test]
    fn test_standard_check_value() {
        // CRC-16/MODBUS check value
        assert_eq!(checksum(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_single_byte() {
        assert_eq!(checksum(&[0x01]), 0x807E);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }
}
