//! Compact Position Reporting: local decode against a reference position.
//!
//! A single even or odd frame is resolved to the zone nearest the reference.
//! Airborne frames span 360° and are unambiguous within ~180 NM; surface
//! frames span 90° and need a reference within ~45 NM.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)

use crate::types::ReferencePosition;

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = (1u32 << NB) as f64;

/// One encoded position as carried in the ME field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CprFrame {
    pub lat: u32,
    pub lon: u32,
    pub odd: bool,
}

impl CprFrame {
    /// Pull the F flag and both 17-bit coordinates out of a 56-bit ME field.
    pub fn from_me_bits(bits: u64) -> Self {
        CprFrame {
            odd: (bits >> 34) & 1 == 1,
            lat: ((bits >> 17) & 0x1FFFF) as u32,
            lon: (bits & 0x1FFFF) as u32,
        }
    }
}

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 1 near poles to 59 at equator.
pub fn nl(lat: f64) -> i32 {
    if lat.abs() >= 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = (std::f64::consts::PI / 180.0 * lat.abs()).cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    nl_val.max(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Zone index that puts the decoded value closest to `reference`.
fn zone_index(reference: f64, zone_size: f64, fraction: f64) -> f64 {
    (reference / zone_size).floor() + (modulo(reference, zone_size) / zone_size - fraction + 0.5).floor()
}

fn decode_with_span(frame: CprFrame, reference: ReferencePosition, span: f64) -> (f64, f64) {
    let i = if frame.odd { 1.0 } else { 0.0 };
    let yz = frame.lat as f64 / CPR_MAX;
    let xz = frame.lon as f64 / CPR_MAX;

    let dlat = span / (4.0 * NZ - i);
    let mut lat = dlat * (zone_index(reference.lat, dlat, yz) + yz);

    let n_lon = (nl(lat) - i as i32).max(1);
    let dlon = span / n_lon as f64;
    let mut lon = dlon * (zone_index(reference.lon, dlon, xz) + xz);

    if lat > 90.0 {
        lat -= 360.0;
    }
    if lon >= 180.0 {
        lon -= 360.0;
    }

    (round6(lat), round6(lon))
}

/// Local decode of an airborne position frame.
pub fn local_decode_airborne(frame: CprFrame, reference: ReferencePosition) -> (f64, f64) {
    decode_with_span(frame, reference, 360.0)
}

/// Local decode of a surface position frame.
pub fn local_decode_surface(frame: CprFrame, reference: ReferencePosition) -> (f64, f64) {
    decode_with_span(frame, reference, 90.0)
}

/// Round to 6 decimal places.
fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(lat: f64, lon: f64) -> ReferencePosition {
        ReferencePosition { lat, lon }
    }

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-87.0), 1);
        assert_eq!(nl(90.0), 1);
    }

    #[test]
    fn test_nl_mid_latitude() {
        assert_eq!(nl(52.0), 36);
    }

    #[test]
    fn test_from_me_bits() {
        // ME of 8D40621D58C382D690C8AC2863A7
        let frame = CprFrame::from_me_bits(0x58C382D690C8AC);
        assert_eq!(
            frame,
            CprFrame {
                lat: 93000,
                lon: 51372,
                odd: false
            }
        );
    }

    #[test]
    fn test_local_decode_airborne_even() {
        let frame = CprFrame {
            lat: 93000,
            lon: 51372,
            odd: false,
        };
        let (lat, lon) = local_decode_airborne(frame, reference(52.258, 3.918));
        assert!((lat - 52.2572).abs() < 1e-4, "lat {lat}");
        assert!((lon - 3.9194).abs() < 1e-4, "lon {lon}");
    }

    #[test]
    fn test_local_decode_airborne_odd() {
        let frame = CprFrame {
            lat: 74158,
            lon: 50194,
            odd: true,
        };
        let (lat, lon) = local_decode_airborne(frame, reference(52.258, 3.918));
        assert!((lat - 52.2658).abs() < 1e-4, "lat {lat}");
        assert!((lon - 3.9389).abs() < 1e-4, "lon {lon}");
    }

    #[test]
    fn test_local_decode_surface() {
        // ME of 8C4841753A9A153237AEF0F275BE (TC 7, odd)
        let frame = CprFrame::from_me_bits(0x3A9A153237AEF0);
        assert!(frame.odd);
        let (lat, lon) = local_decode_surface(frame, reference(51.99, 4.375));
        assert!((lat - 52.320561).abs() < 1e-5, "lat {lat}");
        assert!((lon - 4.735735).abs() < 1e-5, "lon {lon}");
    }

    #[test]
    fn test_local_decode_western_hemisphere() {
        // Reference and result both west of Greenwich.
        let frame = CprFrame {
            lat: 93000,
            lon: 51372,
            odd: false,
        };
        let (lat, lon) = local_decode_airborne(frame, reference(52.258, -3.918));
        assert!((lat - 52.2572).abs() < 1e-3);
        assert!(lon < 0.0 && lon > -10.0, "lon {lon}");
    }

    #[test]
    fn test_modulo_negative() {
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
    }
}
