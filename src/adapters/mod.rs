//! Adapter interfaces for external collaborators.
//!
//! The page-automation bots, the generative reranker and the chat
//! notifier all live behind traits here, so the orchestrator only ever
//! sees structured results and errors.

pub mod notify;
pub mod reranker;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{FlightRecord, RunInput, Source};

pub use notify::{NotificationSink, ThreadContext, WebhookNotifier};
pub use reranker::{
    extract_json_from_text, parse_reranked_entries, HttpReranker, RerankedEntry, Reranker,
};

/// Login credentials resolved from an account reference
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Why one source produced no data. Source errors are returned, never
/// panicked across the orchestrator boundary; only a primary-source
/// error is fatal to the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("missing {0} credentials")]
    MissingCredentials(&'static str),

    #[error("source timed out after {0}s")]
    Timeout(u64),

    #[error("no data captured")]
    NoData,

    #[error("{0}")]
    Failed(String),
}

/// Channel-based progress reporting handed to each bot.
///
/// Updates are pushed into a channel the orchestrator drains into the
/// run's ProgressBus; a bot never talks to the bus directly.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<(u8, String)>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(u8, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report progress; delivery is best-effort (a closed receiver just
    /// means nobody is watching any more).
    pub fn update(&self, percent: u8, status: &str) {
        let _ = self.tx.send((percent, status.to_string()));
    }
}

/// Uniform interface over one external flight-data collector.
///
/// A call may take tens of seconds. Returning an empty vec without an
/// error is a valid result.
#[async_trait]
pub trait SourceBot: Send + Sync {
    /// Which source this bot collects from
    fn source(&self) -> Source;

    /// `candidates` is the primary source's selectable set, so a
    /// secondary bot can target exactly those flights (the peer-loads
    /// bot posts load requests for candidates without a report when
    /// `auto_request_peer_loads` is set). Empty for the primary itself.
    async fn run(
        &self,
        trip: &RunInput,
        candidates: &[FlightRecord],
        credentials: Option<&Credentials>,
        progress: ProgressSink,
    ) -> Result<Vec<FlightRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_sink_delivers_updates() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.update(40, "running");
        assert_eq!(rx.recv().await.unwrap(), (40, "running".to_string()));
    }

    #[test]
    fn test_progress_sink_tolerates_closed_receiver() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.update(90, "almost done");
    }

    #[test]
    fn test_source_error_messages() {
        assert_eq!(
            SourceError::MissingCredentials("schedule_portal").to_string(),
            "missing schedule_portal credentials"
        );
        assert_eq!(SourceError::Timeout(45).to_string(), "source timed out after 45s");
    }
}
