//! Run input: the trip request submitted by the caller.
//!
//! Validation mirrors the submission form: it collects every problem
//! instead of stopping at the first, so the caller sees the full list.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One leg of the trip (route only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripLeg {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
}

/// Date/time/cabin for one leg
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItineraryLeg {
    /// MM/DD/YYYY
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    /// Cabin class, free-form ("Economy", "Business", ...)
    #[serde(default)]
    pub class: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Traveller {
    #[serde(default)]
    pub name: String,
    /// "MR" or "MS"
    #[serde(default)]
    pub salutation: String,
    #[serde(default)]
    pub checked: Option<bool>,
}

/// Companion travelling on the same request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelPartner {
    /// "adult" or "child"
    #[serde(default, rename = "type")]
    pub partner_type: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub salutation: String,
    /// MM/DD/YYYY, required for children
    #[serde(default)]
    pub dob: String,
    #[serde(default)]
    pub own_seat: Option<bool>,
}

/// The full trip request for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInput {
    /// "one-way", "round-trip" or "multiple-legs"
    #[serde(default)]
    pub flight_type: String,

    /// Portal travel status (e.g. "Standby (R1)", "Booked (R2)")
    #[serde(default)]
    pub travel_status: String,

    #[serde(default)]
    pub airline: String,

    #[serde(default)]
    pub nonstop_flights: Option<bool>,

    /// Automatically post a load request on the peer network when no
    /// report exists for a selectable flight
    #[serde(default)]
    pub auto_request_peer_loads: Option<bool>,

    #[serde(default)]
    pub trips: Vec<TripLeg>,

    #[serde(default)]
    pub itinerary: Vec<ItineraryLeg>,

    #[serde(default)]
    pub traveller: Vec<Traveller>,

    #[serde(default)]
    pub travel_partner: Vec<TravelPartner>,

    /// Reference to stored primary-source credentials
    #[serde(default)]
    pub account_id: Option<i64>,
}

fn is_valid_date_mmddyyyy(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%m/%d/%Y").is_ok()
}

impl RunInput {
    /// Validate and normalize in place; returns every problem found.
    /// An empty vec means the input is runnable.
    pub fn validate(&mut self) -> Vec<String> {
        let mut errors = Vec::new();

        self.flight_type = self.flight_type.trim().to_string();
        self.travel_status = self.travel_status.trim().to_string();
        if self.flight_type.is_empty() {
            errors.push("flight_type is required.".to_string());
        }
        if self.travel_status.is_empty() {
            errors.push("travel_status is required.".to_string());
        }

        if self.nonstop_flights.is_none() {
            self.nonstop_flights = Some(false);
        }
        if self.auto_request_peer_loads.is_none() {
            self.auto_request_peer_loads = Some(false);
        }

        if self.trips.is_empty() {
            errors.push("trips must be a non-empty array.".to_string());
        }
        for (idx, trip) in self.trips.iter().enumerate() {
            if trip.origin.trim().is_empty() {
                errors.push(format!("trips[{idx}].origin is required."));
            }
            if trip.destination.trim().is_empty() {
                errors.push(format!("trips[{idx}].destination is required."));
            }
        }

        if self.itinerary.is_empty() {
            errors.push("itinerary must be a non-empty array.".to_string());
        }
        for (idx, leg) in self.itinerary.iter().enumerate() {
            let date = leg.date.trim();
            if date.is_empty() {
                errors.push(format!("itinerary[{idx}].date is required."));
            } else if !is_valid_date_mmddyyyy(date) {
                errors.push(format!("itinerary[{idx}].date must be MM/DD/YYYY."));
            }
            if leg.time.trim().is_empty() {
                errors.push(format!("itinerary[{idx}].time is required."));
            }
            if leg.class.trim().is_empty() {
                errors.push(format!("itinerary[{idx}].class is required."));
            }
        }

        match self.flight_type.as_str() {
            "one-way" | "multiple-legs" => {
                if self.trips.is_empty() {
                    errors.push(format!("{} requires at least 1 trip.", self.flight_type));
                }
                if self.itinerary.is_empty() {
                    errors.push(format!(
                        "{} requires at least 1 itinerary entry.",
                        self.flight_type
                    ));
                }
            }
            "round-trip" => {
                if self.trips.len() < 2 {
                    errors.push("round-trip requires 2 trips.".to_string());
                }
                if self.itinerary.len() < 2 {
                    errors.push("round-trip requires 2 itinerary entries.".to_string());
                }
            }
            _ => {}
        }

        for (idx, traveller) in self.traveller.iter_mut().enumerate() {
            if traveller.name.trim().is_empty() {
                errors.push(format!("traveller[{idx}].name is required."));
            }
            let salutation = traveller.salutation.trim().to_uppercase();
            if salutation != "MR" && salutation != "MS" {
                errors.push(format!("traveller[{idx}].salutation must be MR or MS."));
            }
            traveller.salutation = salutation;
            if traveller.checked.is_none() {
                errors.push(format!("traveller[{idx}].checked must be a boolean."));
            }
        }

        for (idx, partner) in self.travel_partner.iter_mut().enumerate() {
            let p_type = partner.partner_type.trim().to_lowercase();
            if p_type != "adult" && p_type != "child" {
                errors.push(format!(
                    "travel_partner[{idx}].type must be Adult or Child."
                ));
            }
            if partner.first_name.trim().is_empty() {
                errors.push(format!("travel_partner[{idx}].first_name is required."));
            }
            if partner.last_name.trim().is_empty() {
                errors.push(format!("travel_partner[{idx}].last_name is required."));
            }
            if partner.own_seat.is_none() {
                partner.own_seat = Some(true);
            }
            if p_type == "adult" {
                let salutation = partner.salutation.trim().to_uppercase();
                if salutation != "MR" && salutation != "MS" {
                    errors.push(format!(
                        "travel_partner[{idx}].salutation must be MR or MS."
                    ));
                }
                partner.salutation = salutation;
            }
            if p_type == "child" {
                let dob = partner.dob.trim();
                if dob.is_empty() {
                    errors.push(format!("travel_partner[{idx}].dob is required for Child."));
                } else if !is_valid_date_mmddyyyy(dob) {
                    errors.push(format!("travel_partner[{idx}].dob must be MM/DD/YYYY."));
                }
            }
            partner.partner_type = p_type;
        }

        errors
    }

    /// "AAA -> BBB" for a single leg, legs joined with " | "
    pub fn route_string(&self) -> String {
        if self.trips.is_empty() {
            return "N/A".to_string();
        }
        self.trips
            .iter()
            .map(|t| {
                format!(
                    "{} -> {}",
                    if t.origin.is_empty() { "?" } else { &t.origin },
                    if t.destination.is_empty() {
                        "?"
                    } else {
                        &t.destination
                    }
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Whether the travel status is a purchasable fare rather than a
    /// standby listing. Drives the ranking mode.
    pub fn is_bookable(&self) -> bool {
        self.travel_status.to_lowercase().contains("book")
    }
}
