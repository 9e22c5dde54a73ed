//! Per-aircraft state and the shared statistics aggregator.
//!
//! Pure logic, no I/O. Each field category (identification, position,
//! velocity, altitude) is replaced independently and carries its own update
//! time, so an identification never clears a known position. Aircraft are
//! never evicted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stats::{ParserStatistics, StatsSnapshot};
use crate::types::{
    serialize_icao, Altitude, DecodeOutcome, DecodedFieldSet, DecodedMessage, Icao,
    Identification, Position, Sighting, Velocity,
};

/// A value and when it was last replaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub value: T,
    pub updated_at: DateTime<Utc>,
}

impl<T> Stamped<T> {
    pub fn new(value: T, updated_at: DateTime<Utc>) -> Self {
        Stamped { value, updated_at }
    }
}

// ---------------------------------------------------------------------------
// Aircraft state
// ---------------------------------------------------------------------------

/// Latest known state for a single aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftState {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub identification: Option<Stamped<Identification>>,
    pub position: Option<Stamped<Position>>,
    pub velocity: Option<Stamped<Velocity>>,
    pub altitude: Option<Stamped<Altitude>>,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    pub last_type_code: Option<u8>,
}

impl AircraftState {
    pub fn new(icao: Icao, timestamp: DateTime<Utc>) -> Self {
        AircraftState {
            icao,
            identification: None,
            position: None,
            velocity: None,
            altitude: None,
            first_seen: timestamp,
            last_seen: timestamp,
            message_count: 0,
            last_type_code: None,
        }
    }

    pub fn callsign(&self) -> Option<&str> {
        self.identification.as_ref().map(|s| s.value.callsign.as_str())
    }

    fn merge_field(&mut self, field: &DecodedFieldSet, at: DateTime<Utc>) {
        match field {
            DecodedFieldSet::Identification(id) => {
                self.identification = Some(Stamped::new(id.clone(), at));
            }
            DecodedFieldSet::Position(p) => {
                self.position = Some(Stamped::new(*p, at));
            }
            DecodedFieldSet::Velocity(v) => {
                self.velocity = Some(Stamped::new(*v, at));
            }
            DecodedFieldSet::Altitude(a) => {
                // Barometric and geometric readings arrive in different
                // messages; keep the other source's last value.
                let merged = match &self.altitude {
                    Some(prev) => Altitude {
                        baro_ft: a.baro_ft.or(prev.value.baro_ft),
                        geo_ft: a.geo_ft.or(prev.value.geo_ft),
                        low_confidence: a.low_confidence,
                    },
                    None => *a,
                };
                self.altitude = Some(Stamped::new(merged, at));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Map of every aircraft seen, keyed by ICAO address.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    aircraft: HashMap<Icao, AircraftState>,
}

impl Tracker {
    pub fn new() -> Self {
        Tracker::default()
    }

    /// Note that an aircraft transmitted, whether or not anything decoded.
    pub fn observe(&mut self, sighting: &Sighting) {
        let ac = self
            .aircraft
            .entry(sighting.icao)
            .or_insert_with(|| AircraftState::new(sighting.icao, sighting.seen_at));
        ac.last_seen = ac.last_seen.max(sighting.seen_at);
        ac.message_count += 1;
        if sighting.type_code.is_some() {
            ac.last_type_code = sighting.type_code;
        }
    }

    /// Merge decoded fields, last value wins per category.
    pub fn apply(&mut self, msg: &DecodedMessage) {
        let ac = self
            .aircraft
            .entry(msg.icao)
            .or_insert_with(|| AircraftState::new(msg.icao, msg.parsed_timestamp));
        for field in &msg.fields {
            ac.merge_field(field, msg.parsed_timestamp);
        }
    }

    pub fn get(&self, icao: &Icao) -> Option<&AircraftState> {
        self.aircraft.get(icao)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// All aircraft, most recently seen first.
    pub fn by_last_seen(&self) -> Vec<&AircraftState> {
        let mut list: Vec<&AircraftState> = self.aircraft.values().collect();
        list.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        list
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Totals {
    stats: ParserStatistics,
    tracker: Tracker,
}

/// Running statistics and aircraft table, shared across transport threads
/// as `Arc<Aggregator>`.
///
/// Every critical section is a bounded merge or clone. A panic in another
/// holder cannot leave totals half-merged, so poisoned locks are recovered.
#[derive(Debug, Default)]
pub struct Aggregator {
    inner: RwLock<Totals>,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Totals> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Totals> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold one decode result into the totals.
    pub fn record(&self, outcome: &DecodeOutcome) {
        let mut totals = self.write();
        totals.stats.merge(&outcome.delta);
        for sighting in &outcome.sightings {
            totals.tracker.observe(sighting);
        }
        for msg in &outcome.messages {
            totals.tracker.apply(msg);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = self.read();
        StatsSnapshot::new(totals.stats, totals.tracker.len(), Utc::now())
    }

    pub fn aircraft(&self, icao: &Icao) -> Option<AircraftState> {
        self.read().tracker.get(icao).cloned()
    }

    /// Copy of every tracked aircraft, most recently seen first.
    pub fn all_aircraft(&self) -> Vec<AircraftState> {
        self.read()
            .tracker
            .by_last_seen()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Zero every counter and forget all aircraft.
    pub fn reset(&self) {
        *self.write() = Totals::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
