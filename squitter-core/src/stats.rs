//! Parser statistics: per-stage counters and derived rates.
//!
//! Each pipeline stage owns one counter group. A `StatsDelta` is a
//! `ParserStatistics` holding only the increments from one buffer; the
//! aggregator folds deltas into its running total with `merge`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Declare a group of `u64` counters with an additive `merge`.
macro_rules! counters {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: u64, )*
        }

        impl $name {
            pub fn merge(&mut self, other: &Self) {
                $( self.$field = self.$field.saturating_add(other.$field); )*
            }
        }
    };
}

counters! {
    /// Which path the classifier chose for each buffer.
    pub struct RoutingCounters {
        passcom_messages_processed,
        gdl90_messages_processed,
        raw_messages_processed,
    }
}

counters! {
    /// GDL-90/KISS deframer.
    pub struct Gdl90Counters {
        frames_processed,
        adsb_found,
        other_messages,
        bad_unstuff,
        bad_length,
        truncated,
        /// Escape sequences removed.
        bytes_unstuffed,
    }
}

counters! {
    /// PASSCOM wrapper extraction.
    pub struct PasscomCounters {
        frames_processed,
        /// Records that produced at least one Mode S frame.
        records_with_frames,
        mode_s_frames,
        ascii_hex_conversions,
        ascii_hex_errors,
        wrapper_stripped,
        corrupted_length,
        missing_marker,
        trailing_bytes,
    }
}

counters! {
    /// Mode S validator gate.
    pub struct ValidationCounters {
        frames_validated,
        length_invalid,
        crc_fail,
        df_rejected,
    }
}

counters! {
    /// Type-code dispatch and field decoders.
    pub struct DispatchCounters {
        identifications_decoded,
        positions_decoded,
        positions_without_reference,
        velocities_decoded,
        velocity_unavailable,
        unknown_type_code,
    }
}

counters! {
    /// Barometric and geometric altitude decoding.
    pub struct AltitudeCounters {
        altitudes_decoded,
        barometric_altitudes,
        geometric_altitudes,
        q_bit_one,
        q_bit_zero,
        invalid_gillham,
        altitude_rejected,
        altitude_unavailable,
        altitude_low_confidence,
    }
}

// ---------------------------------------------------------------------------
// ParserStatistics
// ---------------------------------------------------------------------------

/// Monotonic counters for every stage of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParserStatistics {
    pub buffers_processed: u64,
    /// Decoded messages emitted.
    pub messages_parsed: u64,
    /// Buffers that produced no decoded message.
    pub parse_errors: u64,
    pub routing: RoutingCounters,
    pub gdl90: Gdl90Counters,
    pub passcom: PasscomCounters,
    pub validation: ValidationCounters,
    pub dispatch: DispatchCounters,
    pub altitude: AltitudeCounters,
}

/// Increments produced by a single decode call.
pub type StatsDelta = ParserStatistics;

impl ParserStatistics {
    pub fn merge(&mut self, other: &Self) {
        self.buffers_processed = self.buffers_processed.saturating_add(other.buffers_processed);
        self.messages_parsed = self.messages_parsed.saturating_add(other.messages_parsed);
        self.parse_errors = self.parse_errors.saturating_add(other.parse_errors);
        self.routing.merge(&other.routing);
        self.gdl90.merge(&other.gdl90);
        self.passcom.merge(&other.passcom);
        self.validation.merge(&other.validation);
        self.dispatch.merge(&other.dispatch);
        self.altitude.merge(&other.altitude);
    }

    /// Percentage of buffers that yielded at least one message.
    pub fn success_rate(&self) -> f64 {
        percent(
            self.buffers_processed.saturating_sub(self.parse_errors),
            self.buffers_processed,
        )
    }

    /// Percentage of GDL-90 frames that carried an ADS-B report.
    pub fn gdl90_success_rate(&self) -> f64 {
        percent(self.gdl90.adsb_found, self.gdl90.frames_processed)
    }

    /// Percentage of PASSCOM records that yielded Mode S frames.
    pub fn passcom_success_rate(&self) -> f64 {
        percent(self.passcom.records_with_frames, self.passcom.frames_processed)
    }

    /// Share of barometric altitudes sent with 25-ft (Q=1) encoding.
    pub fn q_bit_one_percent(&self) -> f64 {
        percent(
            self.altitude.q_bit_one,
            self.altitude.q_bit_one + self.altitude.q_bit_zero,
        )
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of the aggregator, safe to hand to a display thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub counters: ParserStatistics,
    pub aircraft_tracked: usize,
    pub success_rate: f64,
    pub gdl90_success_rate: f64,
    pub passcom_success_rate: f64,
    pub q_bit_one_percent: f64,
    pub taken_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn new(counters: ParserStatistics, aircraft_tracked: usize, taken_at: DateTime<Utc>) -> Self {
        StatsSnapshot {
            success_rate: counters.success_rate(),
            gdl90_success_rate: counters.gdl90_success_rate(),
            passcom_success_rate: counters.passcom_success_rate(),
            q_bit_one_percent: counters.q_bit_one_percent(),
            counters,
            aircraft_tracked,
            taken_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
