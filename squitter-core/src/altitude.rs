//! Altitude decoding: barometric (25-ft binary or Gillham) and geometric.
//!
//! The 12-bit barometric field sits at ME bits 9-20 of TC 9-18 messages:
//!
//! ```text
//! bit  11 10  9  8  7  6  5  4  3  2  1  0
//!      C1 A1 C2 A2 C4 A4 B1  Q B2 D2 B4 D4
//! ```
//!
//! Q=1 selects 25-ft binary. Q=0 selects the Gillham code of Mode C
//! replies, where D1 (in the Q position) is always zero.
//!
//! Every value passes a sanity gate before it is emitted; a value outside
//! the configured bounds is dropped rather than reported.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AltitudeConfig;
use crate::stats::AltitudeCounters;
use crate::types::{Altitude, DecodeError, Icao};

const Q_BIT: u16 = 0x010;

/// How a barometric altitude was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaroEncoding {
    /// Q=1, 25-ft increments.
    Binary25Ft,
    /// Q=0, 100-ft Gillham code.
    Gillham,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AltitudeSource {
    Barometric,
    Geometric,
}

// ---------------------------------------------------------------------------
// Field decoders
// ---------------------------------------------------------------------------

/// Decode a 12-bit barometric altitude field to feet.
pub fn decode_barometric(code: u16) -> Result<(i32, BaroEncoding), DecodeError> {
    let code = code & 0xFFF;
    if code == 0 {
        return Err(DecodeError::AltitudeUnavailable);
    }
    if code & Q_BIT != 0 {
        let n = ((code >> 5) << 4) | (code & 0x0F);
        Ok((n as i32 * 25 - 1000, BaroEncoding::Binary25Ft))
    } else {
        decode_gillham(code).map(|ft| (ft, BaroEncoding::Gillham))
    }
}

/// Decode the Gillham (Q=0) form of a 12-bit altitude field.
///
/// The 500-ft count is the Gray code D2 D4 A1 A2 A4 B1 B2 B4. The 100-ft
/// count is the Gray-like code C1 C2 C4 (001 011 010 110 100 = 1..5), which
/// runs backwards whenever the 500-ft count is odd.
pub fn decode_gillham(code: u16) -> Result<i32, DecodeError> {
    let bit = |n: u16| (code >> n) & 1 == 1;
    let invalid = Err(DecodeError::InvalidGillham(code));

    let (c1, c2, c4) = (bit(11), bit(9), bit(7));
    if !(c1 || c2 || c4) {
        return invalid;
    }

    let mut one_hundreds: i32 = 0;
    for (set, mask) in [(c1, 7), (c2, 3), (c4, 1)] {
        if set {
            one_hundreds ^= mask;
        }
    }
    // C pattern 100 maps through 7 and is the fifth step.
    if one_hundreds & 5 == 5 {
        one_hundreds ^= 2;
    }
    if one_hundreds > 5 {
        return invalid;
    }

    let mut five_hundreds: i32 = 0;
    for (set, mask) in [
        (bit(2), 0xFF), // D2
        (bit(0), 0x7F), // D4
        (bit(10), 0x3F), // A1
        (bit(8), 0x1F), // A2
        (bit(6), 0x0F), // A4
        (bit(5), 0x07), // B1
        (bit(3), 0x03), // B2
        (bit(1), 0x01), // B4
    ] {
        if set {
            five_hundreds ^= mask;
        }
    }
    if five_hundreds & 1 == 1 {
        one_hundreds = 6 - one_hundreds;
    }

    Ok((five_hundreds * 5 + one_hundreds - 13) * 100)
}

/// Decode the 12-bit geometric altitude field of TC 31 (6.25-ft steps).
pub fn decode_geometric(code: u16) -> Result<i32, DecodeError> {
    let code = code & 0xFFF;
    if code == 0 {
        return Err(DecodeError::AltitudeUnavailable);
    }
    Ok((code as f64 * 6.25 - 1000.0).trunc() as i32)
}

/// Reject altitudes outside the configured sanity bounds.
pub fn check_bounds(feet: i32, config: &AltitudeConfig) -> Result<i32, DecodeError> {
    if (config.min_altitude_ft..=config.max_altitude_ft).contains(&feet) {
        Ok(feet)
    } else {
        Err(DecodeError::AltitudeOutOfRange(feet))
    }
}

// ---------------------------------------------------------------------------
// Rate-of-change monitor
// ---------------------------------------------------------------------------

/// Last altitude per aircraft, for climb-rate plausibility checks.
#[derive(Debug, Clone, Default)]
pub struct RateMonitor {
    last: HashMap<(Icao, AltitudeSource), (i32, DateTime<Utc>)>,
}

impl RateMonitor {
    /// Record a reading; true when it implies a climb or descent faster than
    /// `max_fpm` since the previous reading from the same source.
    pub fn observe(
        &mut self,
        icao: Icao,
        source: AltitudeSource,
        feet: i32,
        at: DateTime<Utc>,
        max_fpm: f64,
    ) -> bool {
        let prev = self.last.insert((icao, source), (feet, at));
        let Some((prev_feet, prev_at)) = prev else {
            return false;
        };
        let minutes = (at - prev_at).num_milliseconds() as f64 / 60_000.0;
        if minutes <= 0.0 {
            return false;
        }
        (feet - prev_feet).abs() as f64 / minutes > max_fpm
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Altitude decoder
// ---------------------------------------------------------------------------

/// Field decoding plus sanity gate and optional rate check, with counting.
#[derive(Debug, Clone)]
pub struct AltitudeDecoder {
    config: AltitudeConfig,
    monitor: RateMonitor,
}

impl AltitudeDecoder {
    pub fn new(config: AltitudeConfig) -> Self {
        AltitudeDecoder {
            config,
            monitor: RateMonitor::default(),
        }
    }

    /// Barometric altitude from a TC 9-18 field. `None` if nothing may be
    /// emitted; the reason is counted.
    pub fn barometric(
        &mut self,
        icao: Icao,
        code: u16,
        at: DateTime<Utc>,
        counters: &mut AltitudeCounters,
    ) -> Option<Altitude> {
        if code != 0 {
            if code & Q_BIT != 0 {
                counters.q_bit_one += 1;
            } else {
                counters.q_bit_zero += 1;
            }
        }
        let feet = self.gate(decode_barometric(code).map(|(ft, _)| ft), counters)?;
        counters.barometric_altitudes += 1;
        let low_confidence = self.rate_check(icao, AltitudeSource::Barometric, feet, at, counters);
        Some(Altitude {
            baro_ft: Some(feet),
            geo_ft: None,
            low_confidence,
        })
    }

    /// Geometric altitude from a TC 31 field.
    pub fn geometric(
        &mut self,
        icao: Icao,
        code: u16,
        at: DateTime<Utc>,
        counters: &mut AltitudeCounters,
    ) -> Option<Altitude> {
        let feet = self.gate(decode_geometric(code), counters)?;
        counters.geometric_altitudes += 1;
        let low_confidence = self.rate_check(icao, AltitudeSource::Geometric, feet, at, counters);
        Some(Altitude {
            baro_ft: None,
            geo_ft: Some(feet),
            low_confidence,
        })
    }

    fn gate(
        &self,
        decoded: Result<i32, DecodeError>,
        counters: &mut AltitudeCounters,
    ) -> Option<i32> {
        match decoded.and_then(|ft| check_bounds(ft, &self.config)) {
            Ok(ft) => {
                counters.altitudes_decoded += 1;
                Some(ft)
            }
            Err(DecodeError::AltitudeUnavailable) => {
                counters.altitude_unavailable += 1;
                None
            }
            Err(DecodeError::InvalidGillham(code)) => {
                debug!(code = format_args!("{code:03X}"), "invalid Gillham altitude");
                counters.invalid_gillham += 1;
                None
            }
            Err(e) => {
                debug!(error = %e, "altitude rejected");
                counters.altitude_rejected += 1;
                None
            }
        }
    }

    fn rate_check(
        &mut self,
        icao: Icao,
        source: AltitudeSource,
        feet: i32,
        at: DateTime<Utc>,
        counters: &mut AltitudeCounters,
    ) -> bool {
        if !self.config.rate_check_enabled {
            return false;
        }
        let flagged = self
            .monitor
            .observe(icao, source, feet, at, self.config.max_climb_rate_fpm);
        if flagged {
            debug!(feet, "altitude change exceeds climb-rate limit");
            counters.altitude_low_confidence += 1;
        }
        flagged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
