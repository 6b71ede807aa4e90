//! CRC primitives shared by the transport and the framer.
//!
//! Two checks are in play: the XMODEM packet trailer uses an 8-bit CRC
//! computed with the classic shifted-polynomial register loop, and DSSS
//! frames carry CRC-16/CCITT-FALSE over header+payload.

/// Polynomial 0x07 pre-shifted into the upper bits of a 16-bit register.
const CRC8_POLY_SHIFTED: u16 = 0x1070 << 3;

/// CRC-8 over `data`, register form: feed the byte into the high end, run
/// eight shift-and-conditional-xor iterations, take the high byte.
///
/// Equivalent to CRC-8 with polynomial 0x07, init 0x00, no reflection;
/// `crc8(b"123456789") == 0xF4`.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        let mut reg = u16::from(crc ^ byte) << 8;
        for _ in 0..8 {
            if reg & 0x8000 != 0 {
                reg ^= CRC8_POLY_SHIFTED;
            }
            reg <<= 1;
        }
        crc = (reg >> 8) as u8;
    }
    crc
}

pub const CRC16_CCITT: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0xFFFF,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x29B1,
    residue: 0x0000,
};

/// CRC-16/CCITT-FALSE over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let crc = crc::Crc::<u16>::new(&CRC16_CCITT);
    let mut digest = crc.digest();
    digest.update(data);
    digest.finalize()
}
