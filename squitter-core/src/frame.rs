//! Mode S frame validation.
//!
//! Responsibilities:
//! - Reject candidates that are not 7 or 14 bytes
//! - Compute the CRC-24 remainder and set `crc_valid`
//! - Extract Downlink Format, Capability, and ICAO address
//! - Apply the accepted-DF / CRC policy gate

use crate::crc;
use crate::types::{CandidateFrame, Icao, Provenance, ValidationError};

pub const SHORT_FRAME_BYTES: usize = 7;
pub const LONG_FRAME_BYTES: usize = 14;

/// DFs where the ICAO address is explicit in bytes 1-3.
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

/// Downlink formats transmitted as 56-bit replies.
const SHORT_DFS: &[u8] = &[0, 4, 5, 11];

/// Expected frame length in bytes for a downlink format.
pub fn frame_len_for_df(df: u8) -> usize {
    if SHORT_DFS.contains(&df) {
        SHORT_FRAME_BYTES
    } else {
        LONG_FRAME_BYTES
    }
}

/// Downlink format from the first byte of a frame.
pub fn df_of(first_byte: u8) -> u8 {
    (first_byte >> 3) & 0x1F
}

// ---------------------------------------------------------------------------
// ModeSMessage
// ---------------------------------------------------------------------------

/// A length-checked Mode S frame with its CRC outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSMessage {
    /// Downlink Format (0-31)
    pub df: u8,
    /// Capability, present for DF11/17/18
    pub ca: Option<u8>,
    /// Explicit address for DF11/17/18, CRC residual otherwise
    pub icao: Icao,
    /// CRC remainder was zero
    pub crc_valid: bool,
    /// Full message bytes
    pub raw: Vec<u8>,
    pub provenance: Provenance,
}

impl ModeSMessage {
    /// Build from candidate bytes. Fails only on length.
    pub fn parse(bytes: &[u8], provenance: Provenance) -> Result<Self, ValidationError> {
        if bytes.len() != SHORT_FRAME_BYTES && bytes.len() != LONG_FRAME_BYTES {
            return Err(ValidationError::LengthInvalid(bytes.len()));
        }

        let df = df_of(bytes[0]);
        let remainder = crc::remainder(bytes);

        let (ca, icao) = if DF_EXPLICIT_ICAO.contains(&df) {
            (Some(bytes[0] & 0x07), [bytes[1], bytes[2], bytes[3]])
        } else {
            (
                None,
                [
                    ((remainder >> 16) & 0xFF) as u8,
                    ((remainder >> 8) & 0xFF) as u8,
                    (remainder & 0xFF) as u8,
                ],
            )
        };

        Ok(ModeSMessage {
            df,
            ca,
            icao,
            crc_valid: remainder == 0,
            raw: bytes.to_vec(),
            provenance,
        })
    }

    /// True if this is an extended squitter (DF17/18).
    pub fn is_extended_squitter(&self) -> bool {
        matches!(self.df, 17 | 18)
    }

    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.raw.len() == LONG_FRAME_BYTES
    }

    /// Message Extended field (bytes 4-10, 56 bits). Empty for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() {
            &self.raw[4..11]
        } else {
            &[]
        }
    }

    /// ME field as the low 56 bits of a u64. Zero for short frames.
    pub fn me_bits(&self) -> u64 {
        let me = self.me();
        if me.len() != 7 {
            return 0;
        }
        let mut buf = [0u8; 8];
        buf[1..8].copy_from_slice(me);
        u64::from_be_bytes(buf)
    }

    /// ADS-B Type Code (first 5 bits of ME). None unless DF17/18 long frame.
    pub fn type_code(&self) -> Option<u8> {
        if !self.is_extended_squitter() || !self.is_long() {
            return None;
        }
        Some((self.raw[4] >> 3) & 0x1F)
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Length check, field extraction, and policy gate in one step.
///
/// DF is checked before CRC so each rejection is counted under one reason.
pub fn validate(
    candidate: &CandidateFrame,
    accepted_dfs: &[u8],
) -> Result<ModeSMessage, ValidationError> {
    let msg = ModeSMessage::parse(&candidate.bytes, candidate.provenance)?;
    if !accepted_dfs.contains(&msg.df) {
        return Err(ValidationError::DfRejected(msg.df));
    }
    if !msg.crc_valid {
        return Err(ValidationError::CrcFail(crc::remainder(&msg.raw)));
    }
    Ok(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
