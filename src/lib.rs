//! globalpass - staff-travel flight availability aggregator
//!
//! Coordinates several browser-automation bots that each collect
//! flight-availability data for the same trip from a different external
//! source, merges their results into one record per flight, and ranks
//! the candidates.
//!
//! # Architecture
//!
//! - Each aggregation job is a Run with a `pending -> running ->
//!   {completed | error}` lifecycle and its own progress stream
//! - One run executes bot jobs at a time per process; submission never
//!   blocks, execution queues on a global slot
//! - Flight identity is reconciled purely by flight-number variant
//!   sets; seat data merges by source priority without ever overwriting
//!   populated fields
//! - Ranking is a deterministic heuristic, optionally reordered by a
//!   generative model that degrades gracefully to the heuristic
//!
//! # Modules
//!
//! - `adapters`: external collaborators (source bots, reranker, chat)
//! - `core`: orchestration (Orchestrator, Aggregator, Ranker,
//!   ProgressBus, RunRegistry)
//! - `domain`: data structures (Run, RunInput, FlightRecord)
//! - `store`: run history and account persistence
//! - `cli`: command-line interface

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{
    Aggregator, Orchestrator, ProgressBus, ProgressEvent, Ranker, RunHandle, RunRegistry,
};
pub use domain::{FlightRecord, RankedFlight, Run, RunId, RunInput, RunStatus};
