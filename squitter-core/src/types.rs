//! Shared types, error taxonomy, and decoded message records for squitter-core.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::stats::StatsDelta;

/// Crate-level errors. Only configuration problems surface here; data-quality
/// problems are the per-stage enums below and never leave the pipeline.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdsbError>;

// ---------------------------------------------------------------------------
// Per-stage rejection reasons
// ---------------------------------------------------------------------------

/// Why a wrapper frame (GDL-90 or PASSCOM) was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame truncated: no closing flag")]
    Truncated,
    #[error("invalid byte-stuffing escape sequence")]
    BadUnstuff,
    #[error("unexpected frame length: {0} bytes")]
    BadLength(usize),
    #[error("length field points past end of buffer (declared {declared}, available {available})")]
    CorruptedLengthField { declared: usize, available: usize },
    #[error("wrapper preamble without frame marker")]
    MissingMarker,
}

/// Why a candidate Mode S frame did not pass the validator gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("candidate length {0} is not 7 or 14 bytes")]
    LengthInvalid(usize),
    #[error("CRC check failed (remainder {0:06X})")]
    CrcFail(u32),
    #[error("downlink format {0} not accepted")]
    DfRejected(u8),
}

/// Why a field (or a whole message) produced no decoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("altitude code {0:03X} is not a valid Gillham pattern")]
    InvalidGillham(u16),
    #[error("altitude {0} ft outside sanity bounds")]
    AltitudeOutOfRange(i32),
    #[error("altitude not available")]
    AltitudeUnavailable,
    #[error("no decoder for type code {0}")]
    UnknownTypeCode(u8),
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address. Stored as raw bytes to avoid per-frame String allocation.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char lowercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02x}{:02x}{:02x}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string (either case) into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some(icao_from_u32(val))
}

/// Build ICAO from a 24-bit integer.
pub fn icao_from_u32(val: u32) -> Icao {
    [
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ]
}

pub(crate) fn serialize_icao<S: Serializer>(icao: &Icao, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&icao_to_string(icao))
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

/// Encode bytes as lowercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ADS-B callsign character set
// ---------------------------------------------------------------------------

/// 6-bit callsign alphabet. Space is rendered as `_` so callsigns keep their
/// fixed 8-character width; unassigned codes are `#`.
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ#####_###############0123456789######";

// ---------------------------------------------------------------------------
// Pipeline inputs
// ---------------------------------------------------------------------------

/// Bytes received from a transport, stamped with their arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawBuffer {
    pub fn new(data: impl Into<Vec<u8>>, received_at: DateTime<Utc>) -> Self {
        RawBuffer {
            data: data.into(),
            received_at,
        }
    }

    /// Stamp with the current wall-clock time.
    pub fn now(data: impl Into<Vec<u8>>) -> Self {
        RawBuffer::new(data, Utc::now())
    }
}

/// Fixed reference coordinate used for local CPR decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct ReferencePosition {
    pub lat: f64,
    pub lon: f64,
}

/// Which wrapper a candidate frame was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Raw,
    Gdl90,
    Passcom,
}

/// A byte string believed to be one Mode S message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFrame {
    pub bytes: Vec<u8>,
    pub provenance: Provenance,
}

impl CandidateFrame {
    pub fn new(bytes: impl Into<Vec<u8>>, provenance: Provenance) -> Self {
        CandidateFrame {
            bytes: bytes.into(),
            provenance,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded field sets
// ---------------------------------------------------------------------------

/// Speed reference for a velocity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedType {
    Ground,
    Ias,
    Tas,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub callsign: String,
    pub category: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub surface: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Velocity {
    pub speed_knots: Option<u32>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub speed_type: SpeedType,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Altitude {
    pub baro_ft: Option<i32>,
    pub geo_ft: Option<i32>,
    /// Set when the change since the previous reading exceeded the climb limit.
    pub low_confidence: bool,
}

/// One decoded category of fields. A message yields one of these, or
/// Altitude + Position for airborne position reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedFieldSet {
    Identification(Identification),
    Position(Position),
    Velocity(Velocity),
    Altitude(Altitude),
}

/// A fully decoded ADS-B message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub df: u8,
    pub type_code: u8,
    pub provenance: Provenance,
    pub parsed_timestamp: DateTime<Utc>,
    pub fields: Vec<DecodedFieldSet>,
}

impl DecodedMessage {
    pub fn icao_hex(&self) -> String {
        icao_to_string(&self.icao)
    }

    pub fn identification(&self) -> Option<&Identification> {
        self.fields.iter().find_map(|f| match f {
            DecodedFieldSet::Identification(id) => Some(id),
            _ => None,
        })
    }

    pub fn position(&self) -> Option<&Position> {
        self.fields.iter().find_map(|f| match f {
            DecodedFieldSet::Position(p) => Some(p),
            _ => None,
        })
    }

    pub fn velocity(&self) -> Option<&Velocity> {
        self.fields.iter().find_map(|f| match f {
            DecodedFieldSet::Velocity(v) => Some(v),
            _ => None,
        })
    }

    pub fn altitude(&self) -> Option<&Altitude> {
        self.fields.iter().find_map(|f| match f {
            DecodedFieldSet::Altitude(a) => Some(a),
            _ => None,
        })
    }

    pub fn callsign(&self) -> Option<&str> {
        self.identification().map(|id| id.callsign.as_str())
    }

    pub fn category(&self) -> Option<u8> {
        self.identification().map(|id| id.category)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.position().map(|p| p.lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.position().map(|p| p.lon)
    }

    pub fn altitude_baro_ft(&self) -> Option<i32> {
        self.altitude().and_then(|a| a.baro_ft)
    }

    pub fn altitude_geo_ft(&self) -> Option<i32> {
        self.altitude().and_then(|a| a.geo_ft)
    }

    pub fn speed_knots(&self) -> Option<u32> {
        self.velocity().and_then(|v| v.speed_knots)
    }

    pub fn heading_deg(&self) -> Option<f64> {
        self.velocity().and_then(|v| v.heading_deg)
    }

    pub fn vertical_rate_fpm(&self) -> Option<i32> {
        self.velocity().and_then(|v| v.vertical_rate_fpm)
    }
}

// ---------------------------------------------------------------------------
// Pipeline outputs
// ---------------------------------------------------------------------------

/// A validated Mode S message from an aircraft, decoded or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sighting {
    pub icao: Icao,
    pub df: u8,
    /// Present for DF17/18 long frames, including unknown type codes.
    pub type_code: Option<u8>,
    pub seen_at: DateTime<Utc>,
}

/// Everything one buffer produced.
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub messages: Vec<DecodedMessage>,
    /// Every frame that passed the validator gate.
    pub sightings: Vec<Sighting>,
    pub delta: StatsDelta,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
