//! Cross-source flight aggregation.
//!
//! Builds a flight-identity index over the primary source's records and
//! folds secondary-source records into it. Two records describe the
//! same flight iff their flight-number variant sets intersect.
//!
//! Seat merge priority (highest first): peer-network loads, public-fare
//! seat counts, primary-source load class. Merging only ever fills
//! absent fields; a populated field is never overwritten, which also
//! makes the merge idempotent.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::{FlightRecord, Source};

/// How to treat secondary-source records that match no primary record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedPolicy {
    /// Keep them as standalone candidates (exploratory lookups)
    Keep,

    /// Drop them with a log entry (standard runs)
    Discard,
}

/// Outcome of one aggregation pass
#[derive(Debug)]
pub struct AggregateResult {
    /// One record per distinct flight identity
    pub flights: Vec<FlightRecord>,

    /// Secondary records kept as standalone candidates
    pub unmatched_kept: usize,

    /// Secondary records dropped for lack of a primary match
    pub unmatched_discarded: usize,
}

pub struct Aggregator {
    unmatched: UnmatchedPolicy,
}

impl Aggregator {
    pub fn new(unmatched: UnmatchedPolicy) -> Self {
        Self { unmatched }
    }

    /// Merge secondary-source record lists into the primary candidate
    /// set. The primary list seeds identity; its field values win.
    pub fn aggregate(
        &self,
        primary: Vec<FlightRecord>,
        secondary: Vec<(Source, Vec<FlightRecord>)>,
    ) -> AggregateResult {
        let mut flights: Vec<FlightRecord> = Vec::with_capacity(primary.len());
        // Any variant of a flight number points at its record's slot
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in primary {
            Self::insert(&mut flights, &mut index, record);
        }

        let mut unmatched_kept = 0;
        let mut unmatched_discarded = 0;

        for (source, records) in secondary {
            for mut record in records {
                record.sources.insert(source);
                let slot = record
                    .variants()
                    .iter()
                    .find_map(|v| index.get(v).copied());
                match slot {
                    Some(slot) => merge_into(&mut flights[slot], &record),
                    None => match self.unmatched {
                        UnmatchedPolicy::Keep => {
                            debug!(
                                flight = %record.flight_number,
                                source = source.name(),
                                "keeping unmatched secondary record"
                            );
                            unmatched_kept += 1;
                            Self::insert(&mut flights, &mut index, record);
                        }
                        UnmatchedPolicy::Discard => {
                            warn!(
                                flight = %record.flight_number,
                                source = source.name(),
                                "discarding record with no primary match"
                            );
                            unmatched_discarded += 1;
                        }
                    },
                }
            }
        }

        AggregateResult {
            flights,
            unmatched_kept,
            unmatched_discarded,
        }
    }

    fn insert(
        flights: &mut Vec<FlightRecord>,
        index: &mut HashMap<String, usize>,
        record: FlightRecord,
    ) {
        // A variant may already be indexed when two primary rows are the
        // same flight under different spellings; merge instead of
        // duplicating.
        if let Some(slot) = record.variants().iter().find_map(|v| index.get(v).copied()) {
            merge_into(&mut flights[slot], &record);
            return;
        }
        let slot = flights.len();
        for variant in record.variants() {
            index.insert(variant, slot);
        }
        flights.push(record);
    }
}

fn fill_str(existing: &mut String, incoming: &str) {
    if existing.is_empty() && !incoming.is_empty() {
        *existing = incoming.to_string();
    }
}

/// Fold `incoming` into `existing` without overwriting populated fields
fn merge_into(existing: &mut FlightRecord, incoming: &FlightRecord) {
    fill_str(&mut existing.airline_name, &incoming.airline_name);
    fill_str(&mut existing.airline_code, &incoming.airline_code);
    fill_str(&mut existing.origin, &incoming.origin);
    fill_str(&mut existing.destination, &incoming.destination);
    fill_str(&mut existing.departure_time, &incoming.departure_time);
    fill_str(&mut existing.arrival_time, &incoming.arrival_time);
    fill_str(&mut existing.aircraft, &incoming.aircraft);
    fill_str(&mut existing.tariff_class, &incoming.tariff_class);
    if existing.duration_minutes == 0 {
        existing.duration_minutes = incoming.duration_minutes;
    }
    if existing.price.is_none() {
        existing.price = incoming.price;
    }
    existing.selectable |= incoming.selectable;

    if existing.seats.portal_load.is_none() {
        existing.seats.portal_load = incoming.seats.portal_load;
    }
    for (cabin, count) in &incoming.seats.public_seats {
        if count.is_empty() {
            continue;
        }
        existing
            .seats
            .public_seats
            .entry(*cabin)
            .or_insert_with(|| count.clone());
    }
    for (bucket, count) in &incoming.seats.peer_seats {
        if count.is_empty() {
            continue;
        }
        existing
            .seats
            .peer_seats
            .entry(bucket.clone())
            .or_insert_with(|| count.clone());
    }

    for source in &incoming.sources {
        existing.sources.insert(*source);
    }
}
