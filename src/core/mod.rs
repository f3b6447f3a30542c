//! Core orchestration logic.
//!
//! - ProgressBus: per-run event fan-out
//! - RunRegistry: active run handles and the global run slot
//! - Aggregator: cross-source identity and seat merge
//! - Ranker: heuristic scoring with optional generative re-ranking
//! - Orchestrator: the run state machine

pub mod aggregator;
pub mod orchestrator;
pub mod progress;
pub mod ranker;
pub mod registry;

// Re-export commonly used types
pub use aggregator::{AggregateResult, Aggregator, UnmatchedPolicy};
pub use orchestrator::{Orchestrator, RunError};
pub use progress::{ProgressBus, ProgressEvent, Subscription};
pub use ranker::{RankMode, Ranker, Ranking};
pub use registry::{RunHandle, RunRegistry};
