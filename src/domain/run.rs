//! Run lifecycle state.
//!
//! A Run is the record of one aggregation job. Its status moves
//! `Pending -> Running -> {Completed | Error}` and never leaves a
//! terminal state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::input::RunInput;

/// Opaque, time-derived run identifier (`YYYYMMDD_HHMMSS` UTC)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Derive an id from the current UTC time
    pub fn now() -> Self {
        Self(Utc::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Submitted, waiting for the run slot
    Pending,

    /// Holding the run slot, bots executing
    Running,

    /// Finished with output
    Completed,

    /// Finished without usable output
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One aggregation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,

    pub status: RunStatus,

    pub input: RunInput,

    /// Terminal error message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Artifact name -> location (result files, screenshots)
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl Run {
    pub fn new(id: RunId, input: RunInput) -> Self {
        Self {
            id,
            status: RunStatus::Pending,
            input,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            outputs: BTreeMap::new(),
        }
    }

    /// Move to a new status. Transitions out of a terminal state are
    /// refused and return false.
    pub fn transition(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Terminal error transition with message
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if !self.transition(RunStatus::Error) {
            return false;
        }
        self.error = Some(message);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
