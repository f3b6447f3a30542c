//! Domain types for the run orchestrator.
//!
//! - Run input (trip request and validation)
//! - Run lifecycle state
//! - Flight records and identity

pub mod flight;
pub mod input;
pub mod run;

// Re-export commonly used types
pub use flight::{
    duration_to_minutes, flight_number_variants, normalize_flight_number, Cabin, FlightRecord,
    LoadClass, RankedFlight, SeatSnapshot, Source,
};
pub use input::{ItineraryLeg, RunInput, TravelPartner, Traveller, TripLeg};
pub use run::{Run, RunId, RunStatus};
