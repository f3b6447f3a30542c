//! Registry of active runs and the process-wide run slot.
//!
//! The registry is an explicit object injected into the orchestrator;
//! there is no global state. The slot is a semaphore of one permit, so
//! submission never blocks but execution of bot jobs is serialized
//! across concurrently submitted runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::{Run, RunId, RunStatus, Source};

use super::progress::{ProgressBus, ProgressEvent, Subscription};

/// Shared handle to one run: its mutable state plus its progress bus
pub struct RunHandle {
    id: RunId,
    run: Mutex<Run>,
    bus: ProgressBus,
}

impl RunHandle {
    pub fn new(run: Run) -> Arc<Self> {
        Arc::new(Self {
            id: run.id.clone(),
            run: Mutex::new(run),
            bus: ProgressBus::new(),
        })
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Clone of the current run state
    pub fn snapshot(&self) -> Run {
        self.run.lock().expect("run state poisoned").clone()
    }

    /// Mutate run state under the lock
    pub fn with_run<T>(&self, f: impl FnOnce(&mut Run) -> T) -> T {
        let mut run = self.run.lock().expect("run state poisoned");
        f(&mut run)
    }

    pub fn status(&self) -> RunStatus {
        self.run.lock().expect("run state poisoned").status
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: uuid::Uuid) {
        self.bus.unsubscribe(id);
    }

    /// Buffered log line, fanned out to observers
    pub fn log(&self, message: impl Into<String>) {
        self.bus.log(message);
    }

    /// Live bot progress
    pub fn progress(&self, bot: Source, percent: u8, status: Option<&str>) {
        self.bus.progress(bot, percent, status.map(str::to_string));
    }

    /// Broadcast the run's current status/error/completion time
    pub fn push_status(&self) {
        let (status, error, completed_at) = {
            let run = self.run.lock().expect("run state poisoned");
            (run.status, run.error.clone(), run.completed_at)
        };
        self.bus.push_status(status, error, completed_at);
    }
}

/// In-process registry of runs, keyed by run id
pub struct RunRegistry {
    runs: Mutex<HashMap<RunId, Arc<RunHandle>>>,
    slot: Arc<Semaphore>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            // One run may execute bot jobs at a time
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Register a freshly created run and hand back its handle
    pub fn insert(&self, run: Run) -> Arc<RunHandle> {
        let handle = RunHandle::new(run);
        let mut runs = self.runs.lock().expect("registry poisoned");
        runs.insert(handle.id().clone(), Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &RunId) -> Option<Arc<RunHandle>> {
        self.runs.lock().expect("registry poisoned").get(id).cloned()
    }

    pub fn remove(&self, id: &RunId) -> Option<Arc<RunHandle>> {
        self.runs.lock().expect("registry poisoned").remove(id)
    }

    pub fn active_ids(&self) -> Vec<RunId> {
        let runs = self.runs.lock().expect("registry poisoned");
        runs.keys().cloned().collect()
    }

    /// Wait for the global run slot. The permit is held for the whole
    /// run body and released on drop at the terminal transition.
    pub async fn acquire_slot(&self) -> OwnedSemaphorePermit {
        debug!("waiting for run slot");
        Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .expect("run slot semaphore closed")
    }
}
