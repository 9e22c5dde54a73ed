//! Decoder configuration.
//!
//! Loading (files, environment, CLI) belongs to the host application; this
//! module only defines the knobs, their defaults, and validation. The struct
//! derives `Deserialize` so hosts can read it from whatever format they use.

use serde::{Deserialize, Serialize};

use crate::types::{AdsbError, ReferencePosition, Result};

/// Downlink formats whose parity field is a plain CRC, so `crc_valid` means
/// something. Only these may be placed in `accepted_dfs`.
pub const CRC_CHECKABLE_DFS: &[u8] = &[11, 17, 18];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Downlink formats allowed past the validator gate.
    pub accepted_dfs: Vec<u8>,
    /// Reference point for local CPR decoding, used when the caller passes none.
    pub reference: Option<ReferencePosition>,
    pub altitude: AltitudeConfig,
    pub framing: FramingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeConfig {
    pub min_altitude_ft: i32,
    pub max_altitude_ft: i32,
    /// Flag (not drop) altitudes that change faster than `max_climb_rate_fpm`.
    pub rate_check_enabled: bool,
    pub max_climb_rate_fpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Discard GDL-90 frames missing a closing flag instead of holding them.
    pub strict_framing: bool,
    /// Upper bound on bytes held between buffers when not strict.
    pub max_pending_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            accepted_dfs: vec![17, 18],
            reference: None,
            altitude: AltitudeConfig::default(),
            framing: FramingConfig::default(),
        }
    }
}

impl Default for AltitudeConfig {
    fn default() -> Self {
        AltitudeConfig {
            min_altitude_ft: -1000,
            max_altitude_ft: 60000,
            rate_check_enabled: false,
            max_climb_rate_fpm: 6000.0,
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        FramingConfig {
            strict_framing: true,
            max_pending_bytes: 512,
        }
    }
}

impl DecoderConfig {
    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.accepted_dfs.is_empty() {
            return Err(AdsbError::Config("accepted_dfs must not be empty".into()));
        }
        if let Some(df) = self
            .accepted_dfs
            .iter()
            .find(|df| !CRC_CHECKABLE_DFS.contains(df))
        {
            return Err(AdsbError::Config(format!(
                "downlink format {df} cannot be CRC-checked; allowed: {CRC_CHECKABLE_DFS:?}"
            )));
        }
        if self.altitude.min_altitude_ft > self.altitude.max_altitude_ft {
            return Err(AdsbError::Config(format!(
                "altitude bounds inverted: {} > {}",
                self.altitude.min_altitude_ft, self.altitude.max_altitude_ft
            )));
        }
        if !(self.altitude.max_climb_rate_fpm > 0.0) {
            return Err(AdsbError::Config(
                "max_climb_rate_fpm must be positive".into(),
            ));
        }
        if let Some(r) = self.reference {
            if !(-90.0..=90.0).contains(&r.lat) || !(-180.0..=180.0).contains(&r.lon) {
                return Err(AdsbError::Config(format!(
                    "reference position out of range: ({}, {})",
                    r.lat, r.lon
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
