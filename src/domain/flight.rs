//! Flight records and flight-number identity.
//!
//! Flight identity across sources is determined solely by the flight
//! number: normalized (whitespace stripped, upper-cased) and expanded
//! into a variant set so that `"ua 123"` and `"UA0123"` resolve to the
//! same flight.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// External data source that contributed to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Primary staff booking portal (seeds the candidate set)
    SchedulePortal,

    /// Public fare search (commercial seat counts)
    FareSearch,

    /// Peer load-sharing network (staff load reports)
    PeerLoads,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::SchedulePortal => "schedule_portal",
            Source::FareSearch => "fare_search",
            Source::PeerLoads => "peer_loads",
        }
    }
}

/// Coarse availability class reported by the primary source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadClass {
    High,
    Mid,
    Low,
}

impl LoadClass {
    /// Parse the portal's chance strings ("HIGH", "MID"/"MEDIUM", "LOW")
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(LoadClass::High),
            "MID" | "MEDIUM" => Some(LoadClass::Mid),
            "LOW" => Some(LoadClass::Low),
            _ => None,
        }
    }

    /// Project a load class onto the seat band shown to users
    pub fn seat_band(&self) -> &'static str {
        match self {
            LoadClass::High => "9+",
            LoadClass::Mid => "4-8",
            LoadClass::Low => "0-3",
        }
    }
}

/// Cabin class for public-fare seat counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cabin {
    Economy,
    Business,
    First,
}

impl Cabin {
    /// Map a free-form itinerary class string onto a cabin bucket.
    /// Premium economy folds into economy, matching the portal's buckets.
    pub fn from_itinerary_class(value: &str) -> Self {
        let lower = value.trim().to_ascii_lowercase();
        if lower.contains("business") {
            Cabin::Business
        } else if lower.contains("first") {
            Cabin::First
        } else {
            Cabin::Economy
        }
    }
}

/// Per-source seat availability for one flight.
///
/// Fields are absent rather than empty-string when a source did not
/// report; merge logic relies on that distinction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    /// Load class from the primary portal (lowest merge priority)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_load: Option<LoadClass>,

    /// Public-fare seat counts per cabin
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub public_seats: BTreeMap<Cabin, String>,

    /// Peer-network load reports per fare bucket (highest merge priority)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_seats: BTreeMap<String, String>,
}

impl SeatSnapshot {
    pub fn is_empty(&self) -> bool {
        self.portal_load.is_none() && self.public_seats.is_empty() && self.peer_seats.is_empty()
    }
}

/// One flight as reported by a source, or after merging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Canonical flight number (normalized)
    pub flight_number: String,

    pub airline_name: String,

    #[serde(default)]
    pub airline_code: String,

    pub origin: String,
    pub destination: String,

    /// Scheduled departure, "HH:MM" local
    pub departure_time: String,

    /// Scheduled arrival, "HH:MM" local
    #[serde(default)]
    pub arrival_time: String,

    /// Total duration in minutes
    pub duration_minutes: u32,

    pub stops: u32,

    #[serde(default)]
    pub aircraft: String,

    /// Whether the primary source allows this flight to be chosen
    pub selectable: bool,

    /// Listed price, if a fare source reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// Tariff class on the staff fare (e.g. "R1", "R2", "ID")
    #[serde(default)]
    pub tariff_class: String,

    pub seats: SeatSnapshot,

    /// Which sources contributed data to this record
    pub sources: BTreeSet<Source>,
}

impl FlightRecord {
    /// Minimal record as seeded from one source
    pub fn new(flight_number: &str, source: Source) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            flight_number: normalize_flight_number(flight_number),
            airline_name: String::new(),
            airline_code: String::new(),
            origin: String::new(),
            destination: String::new(),
            departure_time: String::new(),
            arrival_time: String::new(),
            duration_minutes: 0,
            stops: 0,
            aircraft: String::new(),
            selectable: false,
            price: None,
            tariff_class: String::new(),
            seats: SeatSnapshot::default(),
            sources,
        }
    }

    /// Variant set for identity matching
    pub fn variants(&self) -> BTreeSet<String> {
        flight_number_variants(&self.flight_number)
    }
}

/// A flight after scoring and ordering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFlight {
    #[serde(flatten)]
    pub flight: FlightRecord,

    pub score: f64,

    /// 1-based position in the ranked list
    pub rank: usize,
}

/// Strip all whitespace and upper-case a flight number
pub fn normalize_flight_number(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Derive the set of string forms considered the same flight number.
///
/// A number of the shape `(letters)(digits)` yields both the original
/// form and the form with leading zeros trimmed from the numeric part,
/// so `UA0123` and `UA123` land in the same set. Anything else yields
/// only its normalized form.
pub fn flight_number_variants(value: &str) -> BTreeSet<String> {
    let normalized = normalize_flight_number(value);
    let mut variants = BTreeSet::new();
    if normalized.is_empty() {
        return variants;
    }
    variants.insert(normalized.clone());

    if let Some(idx) = normalized.find(|c: char| c.is_ascii_digit()) {
        let (prefix, number) = normalized.split_at(idx);
        if !prefix.is_empty()
            && prefix.chars().all(|c| c.is_ascii_alphabetic())
            && number.chars().all(|c| c.is_ascii_digit())
        {
            let trimmed = number.trim_start_matches('0');
            let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
            variants.insert(format!("{prefix}{trimmed}"));
        }
    }
    variants
}

/// Parse "7h 25m" style durations to minutes; unparseable input maps to
/// a full day so it sorts behind every real duration.
pub fn duration_to_minutes(value: &str) -> u32 {
    const UNKNOWN: u32 = 1440;
    let clean = value
        .to_lowercase()
        .replace("hr", "h")
        .replace("min", "m")
        .replace(' ', "");
    if clean.is_empty() {
        return UNKNOWN;
    }
    let (hours, rest) = match clean.split_once('h') {
        Some((h, rest)) => match h.parse::<u32>() {
            Ok(h) => (h, rest),
            Err(_) => return UNKNOWN,
        },
        None => (0, clean.as_str()),
    };
    let minutes = if rest.is_empty() {
        0
    } else {
        match rest.trim_end_matches('m').parse::<u32>() {
            Ok(m) => m,
            Err(_) => return UNKNOWN,
        }
    };
    hours * 60 + minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_whitespace_and_uppercases() {
        assert_eq!(normalize_flight_number("ua 123"), "UA123");
        assert_eq!(normalize_flight_number("  lh 0456 "), "LH0456");
    }

    #[test]
    fn test_variants_include_zero_trimmed_form() {
        let variants = flight_number_variants("UA0123");
        assert!(variants.contains("UA0123"));
        assert!(variants.contains("UA123"));
    }

    #[test]
    fn test_normalized_form_is_member_of_its_own_variants() {
        for s in ["ua 123", "UA0123", "LH456", "9W 0007", "weird-123"] {
            let normalized = normalize_flight_number(s);
            assert!(flight_number_variants(&normalized).contains(&normalized));
        }
    }

    #[test]
    fn test_spaced_and_zero_padded_forms_intersect() {
        let a = flight_number_variants("ua 123");
        let b = flight_number_variants("UA0123");
        assert!(a.intersection(&b).next().is_some());
    }

    #[test]
    fn test_non_pattern_numbers_keep_single_variant() {
        let variants = flight_number_variants("123UA");
        assert_eq!(variants.len(), 1);
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(duration_to_minutes("7h 25m"), 445);
        assert_eq!(duration_to_minutes("2hr 5min"), 125);
        assert_eq!(duration_to_minutes("45m"), 45);
        assert_eq!(duration_to_minutes("3h"), 180);
        assert_eq!(duration_to_minutes("garbage"), 1440);
        assert_eq!(duration_to_minutes(""), 1440);
    }

    #[test]
    fn test_cabin_mapping_buckets() {
        assert_eq!(Cabin::from_itinerary_class("Economy"), Cabin::Economy);
        assert_eq!(Cabin::from_itinerary_class("Premium Economy"), Cabin::Economy);
        assert_eq!(Cabin::from_itinerary_class("Business"), Cabin::Business);
        assert_eq!(Cabin::from_itinerary_class("First Class"), Cabin::First);
    }

    #[test]
    fn test_load_class_parse_and_band() {
        assert_eq!(LoadClass::parse("high"), Some(LoadClass::High));
        assert_eq!(LoadClass::parse("MEDIUM"), Some(LoadClass::Mid));
        assert_eq!(LoadClass::parse("?"), None);
        assert_eq!(LoadClass::High.seat_band(), "9+");
        assert_eq!(LoadClass::Low.seat_band(), "0-3");
    }
}
