//! PASSCOM/PASSTHROUGH wrapper extraction.
//!
//! A GNSS receiver relays captured 1090 MHz traffic over UDP as:
//!
//! ```text
//! "Received packet from <ip>:<port>: " | 0x7E 0x26 | len (u16 BE) | data[len] | trailer
//! ```
//!
//! The preamble is optional. `data` is either binary Mode S frames back to
//! back, or the same bytes as ASCII hex. Only the first record in a buffer is
//! read; everything after it is vendor trailer.

use tracing::{debug, trace};

use crate::frame::{df_of, frame_len_for_df};
use crate::stats::PasscomCounters;
use crate::types::{hex_digit, FrameError};

pub const PREAMBLE_PREFIX: &[u8] = b"Received packet from ";

/// Start-of-record marker ("~&").
pub const MARKER: [u8; 2] = [0x7E, 0x26];

const LENGTH_FIELD_BYTES: usize = 2;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Length of a well-formed `Received packet from <host>:<port>: ` prefix.
pub fn preamble_len(data: &[u8]) -> Option<usize> {
    let rest = data.strip_prefix(PREAMBLE_PREFIX)?;

    let host_len = rest.iter().position(|&b| b == b':')?;
    if host_len == 0 {
        return None;
    }
    let rest = &rest[host_len + 1..];

    let port_len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if port_len == 0 || !rest[port_len..].starts_with(b": ") {
        return None;
    }

    Some(PREAMBLE_PREFIX.len() + host_len + 1 + port_len + 2)
}

/// Offset of the first record marker.
pub fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(MARKER.len()).position(|w| w == MARKER)
}

/// True when the buffer carries a preamble or a record marker.
pub fn detect(data: &[u8]) -> bool {
    preamble_len(data).is_some() || find_marker(data).is_some()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Mode S frames sliced from one buffer.
#[derive(Debug, Default)]
pub struct Extracted {
    pub frames: Vec<Vec<u8>>,
    pub counters: PasscomCounters,
}

/// Locate the first record after the optional preamble and return its data
/// region. The declared length must fit inside the buffer.
pub fn record_region(data: &[u8]) -> Result<&[u8], FrameError> {
    let start = preamble_len(data).unwrap_or(0);
    let body = &data[start..];

    let marker = find_marker(body).ok_or(FrameError::MissingMarker)?;
    let header_end = marker + MARKER.len() + LENGTH_FIELD_BYTES;
    if header_end > body.len() {
        return Err(FrameError::Truncated);
    }

    let declared = u16::from_be_bytes([body[marker + 2], body[marker + 3]]) as usize;
    let available = body.len() - header_end;
    if declared > available {
        return Err(FrameError::CorruptedLengthField {
            declared,
            available,
        });
    }
    Ok(&body[header_end..header_end + declared])
}

/// Outcome of ASCII-hex detection on a data region.
#[derive(Debug, PartialEq, Eq)]
enum Conversion {
    Binary,
    Hex { bytes: Vec<u8>, dropped_nibble: bool },
    /// Looked like hex but contained other characters; kept as binary.
    Rejected,
}

fn convert_ascii_hex(region: &[u8]) -> Conversion {
    match region.first() {
        Some(&b) if b.is_ascii_hexdigit() => {}
        _ => return Conversion::Binary,
    }

    let mut nibbles = Vec::with_capacity(region.len());
    for &c in region.iter().filter(|c| !c.is_ascii_whitespace()) {
        match hex_digit(c) {
            Some(n) => nibbles.push(n),
            None => return Conversion::Rejected,
        }
    }

    let dropped_nibble = nibbles.len() % 2 != 0;
    let bytes = nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect();
    Conversion::Hex {
        bytes,
        dropped_nibble,
    }
}

/// Split back-to-back Mode S frames, sizing each by its DF.
///
/// Returns the frames and the number of trailing bytes too short for a frame.
pub fn split_frames(data: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let len = frame_len_for_df(df_of(data[offset]));
        if offset + len > data.len() {
            break;
        }
        frames.push(data[offset..offset + len].to_vec());
        offset += len;
    }
    (frames, data.len() - offset)
}

/// Strip the wrapper and slice every Mode S frame from the first record.
pub fn extract(data: &[u8]) -> Extracted {
    let mut out = Extracted::default();
    out.counters.frames_processed += 1;

    if preamble_len(data).is_some() {
        out.counters.wrapper_stripped += 1;
    }

    let region = match record_region(data) {
        Ok(region) => region,
        Err(e) => {
            debug!(error = %e, len = data.len(), "PASSCOM buffer discarded");
            match e {
                FrameError::MissingMarker => out.counters.missing_marker += 1,
                _ => out.counters.corrupted_length += 1,
            }
            return out;
        }
    };

    let converted;
    let binary: &[u8] = match convert_ascii_hex(region) {
        Conversion::Binary => region,
        Conversion::Hex {
            bytes,
            dropped_nibble,
        } => {
            out.counters.ascii_hex_conversions += 1;
            if dropped_nibble {
                debug!("odd ASCII-hex length, final nibble dropped");
                out.counters.ascii_hex_errors += 1;
            }
            converted = bytes;
            &converted
        }
        Conversion::Rejected => {
            debug!("data region is not valid ASCII hex, treating as binary");
            out.counters.ascii_hex_errors += 1;
            region
        }
    };

    let (frames, trailing) = split_frames(binary);
    if trailing > 0 {
        trace!(trailing, "discarding PASSCOM bytes short of a frame");
        out.counters.trailing_bytes += trailing as u64;
    }
    out.counters.mode_s_frames += frames.len() as u64;
    if !frames.is_empty() {
        out.counters.records_with_frames += 1;
    }
    out.frames = frames;
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
