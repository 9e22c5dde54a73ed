//! GDL-90/KISS deframing.
//!
//! Wire format of an ADS-B long report:
//!
//! ```text
//! 0x7E | 0x26 | sub-id | 14-byte Mode S frame (stuffed) | 0x7E
//! ```
//!
//! Inside the flags, `0x7E` and `0x7D` are sent as `0x7D` followed by the
//! byte XOR `0x20`. A closing flag also opens the next frame.

use tracing::{debug, trace};

use crate::config::FramingConfig;
use crate::stats::Gdl90Counters;
use crate::types::FrameError;

pub const FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;

/// GDL-90 message id of the ADS-B long report.
pub const MSG_ADSB_LONG: u8 = 0x26;

const HEADER_BYTES: usize = 2;
const ADSB_PAYLOAD_BYTES: usize = 14;

// ---------------------------------------------------------------------------
// Byte stuffing
// ---------------------------------------------------------------------------

/// Remove KISS escapes from the content between two flags.
///
/// Any escape not followed by `0x5E` or `0x5D` (including a lone trailing
/// escape) makes the whole frame malformed.
pub fn unstuff(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        if b != ESCAPE {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(&next) if next == FLAG ^ ESCAPE_XOR || next == ESCAPE ^ ESCAPE_XOR => {
                out.push(next ^ ESCAPE_XOR);
            }
            _ => return Err(FrameError::BadUnstuff),
        }
    }
    Ok(out)
}

/// Escape flag and escape bytes for transmission.
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    for &b in data {
        if b == FLAG || b == ESCAPE {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    out
}

/// Build a complete flagged frame around `payload`.
pub fn encode_frame(msg_id: u8, sub_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + HEADER_BYTES);
    body.push(msg_id);
    body.push(sub_id);
    body.extend_from_slice(payload);

    let mut frame = vec![FLAG];
    frame.extend(stuff(&body));
    frame.push(FLAG);
    frame
}

/// Unstuff one frame body and return its 14-byte ADS-B payload.
///
/// `Ok(None)` means a well-formed frame carrying some other message id.
pub fn extract_adsb(content: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
    let body = unstuff(content)?;
    if body.first() != Some(&MSG_ADSB_LONG) {
        return Ok(None);
    }
    if body.len() != HEADER_BYTES + ADSB_PAYLOAD_BYTES {
        return Err(FrameError::BadLength(body.len()));
    }
    Ok(Some(body[HEADER_BYTES..].to_vec()))
}

// ---------------------------------------------------------------------------
// Deframer
// ---------------------------------------------------------------------------

/// Payloads recovered from one buffer, plus what happened to every frame.
#[derive(Debug, Default)]
pub struct Deframed {
    pub payloads: Vec<Vec<u8>>,
    pub counters: Gdl90Counters,
}

/// Stateful deframer, one per transport stream.
///
/// In strict mode every buffer stands alone. Otherwise an unterminated
/// trailing frame is held and prefixed to the next buffer.
#[derive(Debug, Clone)]
pub struct Gdl90Deframer {
    strict: bool,
    max_pending: usize,
    pending: Vec<u8>,
}

impl Gdl90Deframer {
    pub fn new(config: &FramingConfig) -> Self {
        Gdl90Deframer {
            strict: config.strict_framing,
            max_pending: config.max_pending_bytes,
            pending: Vec::new(),
        }
    }

    /// True while a partial frame from an earlier buffer is held.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True when the first flag in `data` closes the held partial frame and
    /// the joined span is a well-formed frame. A buffer without a flag never
    /// continues it.
    pub fn continues_pending(&self, data: &[u8]) -> bool {
        let Some((&FLAG, held)) = self.pending.split_first() else {
            return false;
        };
        let Some(close) = data.iter().position(|&b| b == FLAG) else {
            return false;
        };
        let mut span = held.to_vec();
        span.extend_from_slice(&data[..close]);
        extract_adsb(&span).is_ok()
    }

    /// Drop any held partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn deframe(&mut self, data: &[u8]) -> Deframed {
        let mut out = Deframed::default();

        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);

        let flags: Vec<usize> = buf
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == FLAG)
            .map(|(i, _)| i)
            .collect();

        for pair in flags.windows(2) {
            let content = &buf[pair[0] + 1..pair[1]];
            if content.is_empty() {
                continue;
            }
            self.process_frame(content, &mut out);
        }

        let Some(&last) = flags.last() else {
            return out;
        };
        let tail = &buf[last + 1..];
        if tail.is_empty() {
            return out;
        }

        if self.strict {
            debug!(bytes = tail.len(), "GDL-90 frame without closing flag discarded");
            out.counters.truncated += 1;
        } else if tail.len() + 1 > self.max_pending {
            debug!(
                bytes = tail.len(),
                limit = self.max_pending,
                "GDL-90 pending frame exceeds limit, discarded"
            );
            out.counters.truncated += 1;
        } else {
            trace!(bytes = tail.len(), "holding partial GDL-90 frame");
            self.pending = buf[last..].to_vec();
        }
        out
    }

    fn process_frame(&self, content: &[u8], out: &mut Deframed) {
        out.counters.frames_processed += 1;
        match extract_adsb(content) {
            Ok(Some(payload)) => {
                // Each escape pair shrinks the frame by one byte.
                out.counters.bytes_unstuffed += (content.len() - HEADER_BYTES - payload.len()) as u64;
                out.counters.adsb_found += 1;
                out.payloads.push(payload);
            }
            Ok(None) => {
                trace!(msg_id = content[0], "skipping non-ADS-B GDL-90 message");
                out.counters.other_messages += 1;
            }
            Err(FrameError::BadLength(len)) => {
                debug!(len, "GDL-90 ADS-B report has wrong length");
                out.counters.bad_length += 1;
            }
            Err(e) => {
                debug!(error = %e, "GDL-90 frame discarded");
                out.counters.bad_unstuff += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
