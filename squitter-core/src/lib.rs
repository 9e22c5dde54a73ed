//! squitter-core: ADS-B Extended Squitter recovery and decoding.
//!
//! Takes receiver buffers (raw Mode S frames, GDL-90 / KISS framed reports,
//! or PASSCOM log records), recovers the 56/112-bit frames inside them, and
//! decodes identification, position, velocity and altitude. No async and no
//! I/O: callers own the transport and hand buffers to a [`Decoder`].

pub mod altitude;
pub mod classify;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod frame;
pub mod gdl90;
pub mod passcom;
pub mod pipeline;
pub mod stats;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{AltitudeConfig, DecoderConfig, FramingConfig};
pub use frame::ModeSMessage;
pub use pipeline::{decode_buffer, Decoder};
pub use stats::{ParserStatistics, StatsDelta, StatsSnapshot};
pub use tracker::{Aggregator, AircraftState, Tracker};
pub use types::*;
