//! CRC-24 parity for Mode S messages.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF11/17/18 the last 24 bits are pure parity, so a valid frame leaves a
//! remainder of 0. Other formats overlay the address on the parity field.
//! No error correction is attempted: any flipped bit must fail the check.

const GENERATOR: u32 = 0xFFF409;

/// Bytes of parity at the end of every Mode S frame.
pub const PARITY_BYTES: usize = 3;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

// ---------------------------------------------------------------------------
// Core CRC functions
// ---------------------------------------------------------------------------

/// Polynomial division of `data` (no parity handling).
fn divide(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &byte| {
        ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF
    })
}

/// Parity the transmitter should append to `payload` (all bytes before the
/// parity field).
pub fn parity(payload: &[u8]) -> u32 {
    divide(payload)
}

/// Mode S CRC-24 remainder: division of the first (n-3) bytes XOR the
/// transmitted parity field. Zero for an intact DF11/17/18 frame.
pub fn remainder(frame: &[u8]) -> u32 {
    if frame.len() <= PARITY_BYTES {
        return frame.iter().fold(0u32, |v, &b| (v << 8) | b as u32) & 0xFFFFFF;
    }
    let split = frame.len() - PARITY_BYTES;
    let transmitted = (frame[split] as u32) << 16
        | (frame[split + 1] as u32) << 8
        | frame[split + 2] as u32;
    divide(&frame[..split]) ^ transmitted
}

/// Overwrite the parity field of `frame` so that it checks clean.
pub fn seal(frame: &mut [u8]) {
    if frame.len() <= PARITY_BYTES {
        return;
    }
    let split = frame.len() - PARITY_BYTES;
    let p = parity(&frame[..split]);
    frame[split] = (p >> 16) as u8;
    frame[split + 1] = (p >> 8) as u8;
    frame[split + 2] = p as u8;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
