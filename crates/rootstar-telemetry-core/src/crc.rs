//! CRC-16 frame checksum
//!
//! Reflected CRC-16 with polynomial `0x8408`, initial register `0xFFFF` and a
//! final XOR of `0xFFFF`, processed least-significant bit first. This is the
//! X.25 / IBM-SDLC parameterisation. The checksum covers every byte from the
//! sync byte up to (not including) the two trailer bytes.

/// Reflected CRC-16 polynomial.
pub const POLYNOMIAL: u16 = 0x8408;

/// Initial register value.
pub const INITIAL: u16 = 0xFFFF;

/// Final XOR mask.
pub const FINAL_XOR: u16 = 0xFFFF;

/// Feed one byte through the CRC register.
#[inline]
#[must_use]
pub const fn update(mut register: u16, byte: u8) -> u16 {
    let mut data = byte;
    let mut bit = 0;
    while bit < 8 {
        if (register ^ data as u16) & 1 == 1 {
            register = (register >> 1) ^ POLYNOMIAL;
        } else {
            register >>= 1;
        }
        data >>= 1;
        bit += 1;
    }
    register
}

/// Compute the CRC-16 of `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |register, &byte| update(register, byte)) ^ FINAL_XOR
}

/// Check a payload against the checksum declared in the frame trailer.
#[must_use]
pub fn validate(payload: &[u8], declared: u16) -> bool {
    crc16(payload) == declared
}
