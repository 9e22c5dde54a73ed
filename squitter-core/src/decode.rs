//! Type-code dispatch and field decoders for DF17/18 extended squitter.
//!
//! - TC 1-4:   Aircraft identification (callsign)
//! - TC 5-8:   Surface position (local CPR)
//! - TC 9-18:  Airborne position (barometric alt + local CPR), TC 15 excluded
//! - TC 19:    Airborne velocity (ground speed or airspeed + heading)
//! - TC 31:    Operational status (geometric altitude)
//!
//! Every other type code is unknown: it is counted but yields no fields.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::altitude::AltitudeDecoder;
use crate::cpr::{self, CprFrame};
use crate::frame::ModeSMessage;
use crate::stats::StatsDelta;
use crate::types::{
    icao_to_string, DecodeError, DecodedFieldSet, Identification, Position, ReferencePosition,
    SpeedType, Velocity, CALLSIGN_CHARSET,
};

/// What a type code carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCodeClass {
    Identification,
    SurfacePosition,
    AirbornePosition,
    Velocity,
    OperationalStatus,
    Unknown,
}

impl TypeCodeClass {
    pub fn from_type_code(tc: u8) -> Self {
        match tc {
            1..=4 => TypeCodeClass::Identification,
            5..=8 => TypeCodeClass::SurfacePosition,
            15 => TypeCodeClass::Unknown,
            9..=18 => TypeCodeClass::AirbornePosition,
            19 => TypeCodeClass::Velocity,
            31 => TypeCodeClass::OperationalStatus,
            _ => TypeCodeClass::Unknown,
        }
    }
}

/// 12-bit altitude subfield at ME bits 9-20.
fn altitude_code(bits: u64) -> u16 {
    ((bits >> 36) & 0x0FFF) as u16
}

// ---------------------------------------------------------------------------
// Field decoders
// ---------------------------------------------------------------------------

/// Decode TC 1-4: callsign and 3-bit emitter category.
pub fn decode_identification(bits: u64) -> Identification {
    let category = ((bits >> 48) & 0x07) as u8;

    let callsign = (0..8)
        .map(|i| {
            let idx = ((bits >> (42 - i * 6)) & 0x3F) as usize;
            CALLSIGN_CHARSET[idx] as char
        })
        .collect();

    Identification { callsign, category }
}

/// Decode TC 19. `None` for reserved subtypes.
///
/// Subtypes 2 and 4 are the supersonic variants with 4-knot resolution.
pub fn decode_velocity(bits: u64) -> Option<Velocity> {
    let subtype = ((bits >> 48) & 0x07) as u8;
    let vertical_rate_fpm = vertical_rate(bits);

    match subtype {
        1 | 2 => {
            let scale = if subtype == 2 { 4 } else { 1 };
            let ew_raw = ((bits >> 32) & 0x3FF) as i32;
            let ns_raw = ((bits >> 21) & 0x3FF) as i32;

            let (speed_knots, heading_deg) = if ew_raw > 0 && ns_raw > 0 {
                let ew = (ew_raw - 1) * scale;
                let ns = (ns_raw - 1) * scale;
                let vx = f64::from(if (bits >> 42) & 1 == 1 { -ew } else { ew });
                let vy = f64::from(if (bits >> 31) & 1 == 1 { -ns } else { ns });
                let speed = (vx * vx + vy * vy).sqrt();
                let heading = vx.atan2(vy).to_degrees().rem_euclid(360.0);
                (Some(speed.round() as u32), Some(round2(heading)))
            } else {
                (None, None)
            };

            Some(Velocity {
                speed_knots,
                heading_deg,
                vertical_rate_fpm,
                speed_type: SpeedType::Ground,
            })
        }
        3 | 4 => {
            let scale = if subtype == 4 { 4 } else { 1 };
            let heading_deg = if (bits >> 42) & 1 == 1 {
                let raw = ((bits >> 32) & 0x3FF) as f64;
                Some(round2(raw * 360.0 / 1024.0))
            } else {
                None
            };
            let speed_raw = ((bits >> 21) & 0x3FF) as u32;
            let speed_knots = (speed_raw > 0).then(|| (speed_raw - 1) * scale);

            Some(Velocity {
                speed_knots,
                heading_deg,
                vertical_rate_fpm,
                speed_type: if (bits >> 31) & 1 == 1 {
                    SpeedType::Tas
                } else {
                    SpeedType::Ias
                },
            })
        }
        _ => None,
    }
}

/// Signed vertical rate in ft/min, 64 ft/min per LSB. Raw 0 is unavailable.
fn vertical_rate(bits: u64) -> Option<i32> {
    let raw = ((bits >> 10) & 0x1FF) as i32;
    if raw == 0 {
        return None;
    }
    let rate = (raw - 1) * 64;
    Some(if (bits >> 19) & 1 == 1 { -rate } else { rate })
}

/// Round to 2 decimal places.
fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Route a validated message to its field decoders.
///
/// Returns the field sets produced, which may be empty (for instance a
/// velocity report with nothing available, or a position with no reference).
/// Messages without a type code (DF11, short frames) yield no fields.
pub fn dispatch(
    msg: &ModeSMessage,
    reference: Option<ReferencePosition>,
    at: DateTime<Utc>,
    altitude: &mut AltitudeDecoder,
    stats: &mut StatsDelta,
) -> Result<Vec<DecodedFieldSet>, DecodeError> {
    let Some(tc) = msg.type_code() else {
        return Ok(Vec::new());
    };
    let bits = msg.me_bits();
    let mut fields = Vec::new();

    match TypeCodeClass::from_type_code(tc) {
        TypeCodeClass::Identification => {
            stats.dispatch.identifications_decoded += 1;
            fields.push(DecodedFieldSet::Identification(decode_identification(bits)));
        }
        TypeCodeClass::SurfacePosition => {
            if let Some(p) = position(bits, reference, true, stats) {
                fields.push(p);
            }
        }
        TypeCodeClass::AirbornePosition => {
            if let Some(alt) =
                altitude.barometric(msg.icao, altitude_code(bits), at, &mut stats.altitude)
            {
                fields.push(DecodedFieldSet::Altitude(alt));
            }
            if let Some(p) = position(bits, reference, false, stats) {
                fields.push(p);
            }
        }
        TypeCodeClass::Velocity => match decode_velocity(bits) {
            Some(v)
                if v.speed_knots.is_some()
                    || v.heading_deg.is_some()
                    || v.vertical_rate_fpm.is_some() =>
            {
                stats.dispatch.velocities_decoded += 1;
                fields.push(DecodedFieldSet::Velocity(v));
            }
            _ => {
                trace!(icao = %icao_to_string(&msg.icao), "velocity not available");
                stats.dispatch.velocity_unavailable += 1;
            }
        },
        TypeCodeClass::OperationalStatus => {
            if let Some(alt) =
                altitude.geometric(msg.icao, altitude_code(bits), at, &mut stats.altitude)
            {
                fields.push(DecodedFieldSet::Altitude(alt));
            }
        }
        TypeCodeClass::Unknown => {
            stats.dispatch.unknown_type_code += 1;
            return Err(DecodeError::UnknownTypeCode(tc));
        }
    }

    Ok(fields)
}

fn position(
    bits: u64,
    reference: Option<ReferencePosition>,
    surface: bool,
    stats: &mut StatsDelta,
) -> Option<DecodedFieldSet> {
    let Some(reference) = reference else {
        stats.dispatch.positions_without_reference += 1;
        return None;
    };
    let frame = CprFrame::from_me_bits(bits);
    let (lat, lon) = if surface {
        cpr::local_decode_surface(frame, reference)
    } else {
        cpr::local_decode_airborne(frame, reference)
    };
    stats.dispatch.positions_decoded += 1;
    Some(DecodedFieldSet::Position(Position { lat, lon, surface }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
