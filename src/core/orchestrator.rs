//! Run orchestration.
//!
//! Drives one run end to end: acquire the global run slot, validate
//! input, resolve credentials, invoke the primary source, fan out the
//! secondary sources, aggregate, rank, persist, finalize. Whatever
//! happens inside the body, the run always reaches a terminal status.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{
    Credentials, NotificationSink, ProgressSink, SourceBot, SourceError, ThreadContext,
};
use crate::domain::{FlightRecord, Run, RunId, RunInput, RunStatus, Source};
use crate::store::Store;

use super::aggregator::{Aggregator, UnmatchedPolicy};
use super::ranker::{RankMode, Ranker};
use super::registry::{RunHandle, RunRegistry};

/// Failures that terminate a run as `error`. Secondary-source,
/// aggregation and reranker problems are absorbed upstream and never
/// reach this type.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid input")]
    Validation(Vec<String>),

    #[error("{0}")]
    Credential(String),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("no selectable flights")]
    NoSelectableFlights,
}

/// Default bound on one bot job
const DEFAULT_BOT_TIMEOUT: Duration = Duration::from_secs(90);

pub struct Orchestrator {
    registry: Arc<RunRegistry>,
    store: Arc<dyn Store>,
    bots: Vec<Arc<dyn SourceBot>>,
    ranker: Ranker,
    notifier: Option<Arc<dyn NotificationSink>>,
    thread: ThreadContext,
    bot_timeout: Duration,
    unmatched: UnmatchedPolicy,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RunRegistry>,
        store: Arc<dyn Store>,
        bots: Vec<Arc<dyn SourceBot>>,
        ranker: Ranker,
    ) -> Self {
        Self {
            registry,
            store,
            bots,
            ranker,
            notifier: None,
            thread: ThreadContext::default(),
            bot_timeout: DEFAULT_BOT_TIMEOUT,
            unmatched: UnmatchedPolicy::Discard,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_bot_timeout(mut self, timeout: Duration) -> Self {
        self.bot_timeout = timeout;
        self
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Create and register a run. Submission never blocks on the run
    /// slot; the caller spawns `execute` to actually run it.
    pub fn submit(&self, input: RunInput) -> Result<Arc<RunHandle>, crate::store::StoreError> {
        let run = Run::new(RunId::now(), input);
        info!(run_id = %run.id, "run submitted");
        self.store.create_run(&run)?;
        Ok(self.registry.insert(run))
    }

    /// Execute a submitted run to a terminal status.
    #[instrument(skip(self, handle), fields(run_id = %handle.id()))]
    pub async fn execute(&self, handle: Arc<RunHandle>) {
        // Serialize heavy bot jobs across runs; held until drop at the
        // end of this function (the terminal transition).
        let _slot = self.registry.acquire_slot().await;

        handle.with_run(|run| run.transition(RunStatus::Running));
        self.persist_status(&handle);
        handle.push_status();
        self.notify(&format!("New run started (Run ID: `{}`)", handle.id()))
            .await;

        match self.run_body(&handle).await {
            Ok(payload) => {
                if let Err(err) = self.store.save_aggregated_result(handle.id(), &payload) {
                    // The ranking survives in the progress log even if
                    // the result row does not.
                    error!(error = %err, "failed to persist aggregated result");
                }
                handle.with_run(|run| {
                    run.outputs
                        .insert("aggregated_result".to_string(), "store".to_string());
                    run.transition(RunStatus::Completed)
                });
                handle.log("Run finished.");
                let route = handle.snapshot().input.route_string();
                self.notify(&format!(
                    "*Run completed* (Run ID: `{}`)\nRoute: {}",
                    handle.id(),
                    route
                ))
                .await;
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "run failed");
                handle.with_run(|run| run.fail(message.clone()));
                handle.log("Run finished with errors.");
                self.notify(&format!(
                    "*Run failed* (Run ID: `{}`)\nError: {}",
                    handle.id(),
                    message
                ))
                .await;
            }
        }

        self.persist_status(&handle);
        info!(status = handle.status().as_str(), "run reached terminal status");
        handle.push_status();
    }

    /// Steps 1-6. Any error return becomes the run's terminal error.
    async fn run_body(&self, handle: &Arc<RunHandle>) -> Result<serde_json::Value, RunError> {
        // 1. Validate
        let mut input = handle.snapshot().input;
        let problems = input.validate();
        if !problems.is_empty() {
            handle.log("Run aborted: invalid input.");
            for problem in &problems {
                handle.log(format!("[validation] {problem}"));
            }
            self.notify(&format!(
                "Validation failed for run `{}`:\n{}",
                handle.id(),
                problems.join("\n")
            ))
            .await;
            return Err(RunError::Validation(problems));
        }
        handle.with_run(|run| run.input = input.clone());

        // 2. Resolve credentials
        let (primary_credentials, peer_credentials) = self.resolve_credentials(handle, &input)?;

        handle.log("Run started; launching primary source.");

        // 3. Primary source, synchronously; its failure is fatal
        let primary = self
            .invoke_bot(
                handle,
                self.primary_bot()?,
                &input,
                &[],
                Some(&primary_credentials),
            )
            .await?;
        let selectable: Vec<FlightRecord> =
            primary.into_iter().filter(|f| f.selectable).collect();
        if selectable.is_empty() {
            handle.log("Primary source: no selectable flights found for this search.");
            return Err(RunError::NoSelectableFlights);
        }
        handle.log(format!(
            "Primary source returned {} selectable flights.",
            selectable.len()
        ));

        // 4. Remaining sources, concurrently against the seeded
        //    candidate set; failures become "no contribution"
        let secondary = self
            .invoke_secondary_bots(handle, &input, &selectable, peer_credentials.as_ref())
            .await;

        // 5. Aggregate, then rank
        let aggregator = Aggregator::new(self.unmatched);
        let result = aggregator.aggregate(selectable, secondary);
        if result.unmatched_discarded > 0 {
            handle.log(format!(
                "Aggregation: {} secondary records had no primary match and were discarded.",
                result.unmatched_discarded
            ));
        }
        if result.unmatched_kept > 0 {
            handle.log(format!(
                "Aggregation: kept {} unmatched secondary records as standalone candidates.",
                result.unmatched_kept
            ));
        }

        let mode = if input.is_bookable() {
            RankMode::Bookable
        } else {
            RankMode::Standby
        };
        let route = input.route_string();
        let ranking = self.ranker.rank(&result.flights, mode, &route).await;
        if self.ranker.has_reranker() && !ranking.reranked {
            handle.log("[reranker] no usable ranking; falling back to heuristic order.");
        }

        // 6. Final payload
        let payload = json!({
            "run_id": handle.id().as_str(),
            "route": route,
            "mode": match mode {
                RankMode::Standby => "standby",
                RankMode::Bookable => "bookable",
            },
            "reranked": ranking.reranked,
            "flights": ranking.flights,
        });
        Ok(payload)
    }

    fn primary_bot(&self) -> Result<&Arc<dyn SourceBot>, RunError> {
        self.bots
            .iter()
            .find(|b| b.source() == Source::SchedulePortal)
            .ok_or_else(|| {
                RunError::Credential("no primary source bot configured".to_string())
            })
    }

    fn resolve_credentials(
        &self,
        handle: &Arc<RunHandle>,
        input: &RunInput,
    ) -> Result<(Credentials, Option<Credentials>), RunError> {
        let account_id = input.account_id.ok_or_else(|| {
            RunError::Credential("missing account_id".to_string())
        })?;

        let account = match self.store.primary_account(account_id) {
            Ok(Some(account)) => account,
            Ok(None) => {
                handle.log(format!(
                    "Primary credentials missing for account_id={account_id}. Run stopped."
                ));
                return Err(RunError::Credential(
                    "missing schedule_portal credentials".to_string(),
                ));
            }
            Err(err) => {
                error!(error = %err, account_id, "primary account lookup failed");
                handle.log(format!(
                    "Primary credentials missing for account_id={account_id}. Run stopped."
                ));
                return Err(RunError::Credential(
                    "missing schedule_portal credentials".to_string(),
                ));
            }
        };

        let peer = match self.store.peer_account(&account.employee_name) {
            Ok(Some(credentials)) => Some(credentials),
            Ok(None) => {
                handle.log(format!(
                    "Peer-network account not found for employee '{}'. Skipping peer loads for this run.",
                    account.employee_name
                ));
                None
            }
            Err(err) => {
                warn!(error = %err, "peer account lookup failed");
                None
            }
        };

        Ok((account.credentials, peer))
    }

    /// Run one bot with its progress channel drained into the bus
    async fn invoke_bot(
        &self,
        handle: &Arc<RunHandle>,
        bot: &Arc<dyn SourceBot>,
        input: &RunInput,
        candidates: &[FlightRecord],
        credentials: Option<&Credentials>,
    ) -> Result<Vec<FlightRecord>, SourceError> {
        let source = bot.source();
        handle.log(format!("[{}] starting", source.name()));

        let (sink, mut rx) = ProgressSink::channel();
        let forwarder = {
            let handle = Arc::clone(handle);
            tokio::spawn(async move {
                while let Some((percent, status)) = rx.recv().await {
                    handle.progress(source, percent, Some(&status));
                }
            })
        };

        let outcome = timeout(self.bot_timeout, bot.run(input, candidates, credentials, sink)).await;
        // The sink is gone once the bot future resolves or is dropped,
        // so the forwarder drains and finishes on its own.
        let _ = forwarder.await;

        match outcome {
            Ok(Ok(records)) => {
                if records.is_empty() {
                    handle.log(format!(
                        "[{}] finished but no data was captured",
                        source.name()
                    ));
                } else {
                    handle.log(format!(
                        "[{}] finished with {} records",
                        source.name(),
                        records.len()
                    ));
                }
                Ok(records)
            }
            Ok(Err(err)) => {
                handle.log(format!("[{}] error: {err}", source.name()));
                Err(err)
            }
            Err(_) => {
                let err = SourceError::Timeout(self.bot_timeout.as_secs());
                handle.log(format!("[{}] error: {err}", source.name()));
                Err(err)
            }
        }
    }

    /// Fan out every non-primary bot and join them all; a failed bot
    /// contributes an empty record list.
    async fn invoke_secondary_bots(
        &self,
        handle: &Arc<RunHandle>,
        input: &RunInput,
        candidates: &[FlightRecord],
        peer_credentials: Option<&Credentials>,
    ) -> Vec<(Source, Vec<FlightRecord>)> {
        let mut joins: JoinSet<(Source, Vec<FlightRecord>)> = JoinSet::new();
        let mut contributions = Vec::new();

        for bot in &self.bots {
            let source = bot.source();
            if source == Source::SchedulePortal {
                continue;
            }
            let credentials = match source {
                Source::PeerLoads => match peer_credentials {
                    Some(c) => Some(c.clone()),
                    None => {
                        handle.log("[peer_loads] skipped: no account credentials available.");
                        contributions.push((source, Vec::new()));
                        continue;
                    }
                },
                _ => None,
            };

            let bot = Arc::clone(bot);
            let handle = Arc::clone(handle);
            let input = input.clone();
            let candidates = candidates.to_vec();
            let bot_timeout = self.bot_timeout;
            joins.spawn(async move {
                let source = bot.source();
                handle.log(format!("[{}] starting", source.name()));

                let (sink, mut rx) = ProgressSink::channel();
                let forwarder = {
                    let handle = Arc::clone(&handle);
                    tokio::spawn(async move {
                        while let Some((percent, status)) = rx.recv().await {
                            handle.progress(source, percent, Some(&status));
                        }
                    })
                };

                let outcome =
                    timeout(bot_timeout, bot.run(&input, &candidates, credentials.as_ref(), sink))
                        .await;
                let _ = forwarder.await;

                match outcome {
                    Ok(Ok(records)) => {
                        handle.log(format!(
                            "[{}] finished with {} records",
                            source.name(),
                            records.len()
                        ));
                        (source, records)
                    }
                    Ok(Err(err)) => {
                        handle.log(format!("[{}] error: {err}", source.name()));
                        (source, Vec::new())
                    }
                    Err(_) => {
                        handle.log(format!(
                            "[{}] error: {}",
                            source.name(),
                            SourceError::Timeout(bot_timeout.as_secs())
                        ));
                        (source, Vec::new())
                    }
                }
            });
        }

        // Barrier: every job completes, successes and failures both
        // collected; a panicked task counts as no contribution.
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(contribution) => contributions.push(contribution),
                Err(err) => {
                    error!(error = %err, "secondary bot task failed to join");
                }
            }
        }
        contributions
    }

    fn persist_status(&self, handle: &Arc<RunHandle>) {
        let run = handle.snapshot();
        if let Err(err) = self.store.update_run(&run) {
            error!(error = %err, "failed to persist run status");
        }
    }

    async fn notify(&self, message: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(err) = notifier.notify(message, &self.thread).await {
            debug!(error = %err, "notification failed");
        }
    }

    /// Sources configured on this orchestrator (primary first)
    pub fn sources(&self) -> BTreeSet<Source> {
        self.bots.iter().map(|b| b.source()).collect()
    }
}
