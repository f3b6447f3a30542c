//! Per-run progress fan-out.
//!
//! Every run owns a ProgressBus. Log lines are buffered so a late
//! subscriber can replay history; bot progress and status pushes are
//! live-only. Subscribers whose receiving end has gone away are dropped
//! silently on the next broadcast.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{RunStatus, Source};

/// Event delivered to run observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Buffered log line
    Log {
        ts: DateTime<Utc>,
        message: String,
    },

    /// Incremental bot progress (not buffered)
    Progress {
        bot: String,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// Run-level status push; a terminal one ends the stream
    Status {
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed_at: Option<DateTime<Utc>>,
    },
}

/// A live subscription: buffered history plus the live event stream
pub struct Subscription {
    /// Log events emitted before this subscriber attached
    pub history: Vec<ProgressEvent>,

    /// Live events from the moment of subscription
    pub events: mpsc::UnboundedReceiver<ProgressEvent>,

    pub id: Uuid,
}

#[derive(Default)]
struct BusInner {
    history: Vec<ProgressEvent>,
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<ProgressEvent>>,
}

/// Publish/subscribe channel for one run
#[derive(Default)]
pub struct ProgressBus {
    inner: Mutex<BusInner>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer. History is a snapshot of buffered log lines;
    /// everything broadcast afterwards arrives on the live channel.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().expect("progress bus poisoned");
        let history = inner.history.clone();
        inner.subscribers.insert(id, tx);
        Subscription {
            history,
            events: rx,
            id,
        }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let mut inner = self.inner.lock().expect("progress bus poisoned");
        inner.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("progress bus poisoned").subscribers.len()
    }

    /// Append to history and broadcast
    pub fn log(&self, message: impl Into<String>) {
        let event = ProgressEvent::Log {
            ts: Utc::now(),
            message: message.into(),
        };
        self.broadcast(event, true);
    }

    /// Broadcast bot progress without buffering. Percent is clamped to
    /// 0..=100.
    pub fn progress(&self, bot: Source, percent: u8, status: Option<String>) {
        let event = ProgressEvent::Progress {
            bot: bot.name().to_string(),
            percent: percent.min(100),
            status,
        };
        self.broadcast(event, false);
    }

    /// Broadcast the run's current status
    pub fn push_status(
        &self,
        status: RunStatus,
        error: Option<String>,
        completed_at: Option<DateTime<Utc>>,
    ) {
        let event = ProgressEvent::Status {
            status,
            error,
            completed_at,
        };
        self.broadcast(event, false);
    }

    fn broadcast(&self, event: ProgressEvent, store: bool) {
        let mut inner = self.inner.lock().expect("progress bus poisoned");
        if store {
            inner.history.push(event.clone());
        }
        // Collect stale ids first so removal never races the iteration
        let stale: Vec<Uuid> = inner
            .subscribers
            .iter()
            .filter(|(_, tx)| tx.send(event.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            inner.subscribers.remove(&id);
        }
    }
}
