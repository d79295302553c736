//! CRC16-CCITT checksum used as the KHQR trailer (tag 63).

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Compute CRC16-CCITT (poly 0x1021, init 0xFFFF, no final XOR) over `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        let mut crc = crc ^ (u16::from(byte) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Checksum of `payload` as exactly four uppercase hex digits.
///
/// `payload` must already end with the `6304` tag and length.
#[must_use]
pub fn checksum_hex(payload: &str) -> String {
    format!("{:04X}", crc16(payload.as_bytes()))
}
