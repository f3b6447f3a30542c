//! Orchestrator integration tests.
//!
//! Runs the full state machine against in-memory stores and scripted
//! source bots.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use globalpass::adapters::{Credentials, ProgressSink, SourceBot, SourceError};
use globalpass::core::{Orchestrator, ProgressEvent, Ranker, RunRegistry};
use globalpass::domain::{
    Cabin, FlightRecord, ItineraryLeg, LoadClass, RunId, RunInput, RunStatus, Source, Traveller,
    TripLeg,
};
use globalpass::store::{PrimaryAccount, SqliteStore, Store, StoreError};

/// Scripted bot: fixed result, optional delay, call log
struct ScriptedBot {
    source: Source,
    records: Vec<FlightRecord>,
    fail: bool,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBot {
    fn new(source: Source, records: Vec<FlightRecord>) -> Self {
        Self {
            source,
            records,
            fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(source: Source) -> Self {
        Self {
            fail: true,
            ..Self::new(source, Vec::new())
        }
    }

    fn hanging(source: Source, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(source, Vec::new())
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_call_log(mut self, calls: Arc<Mutex<Vec<String>>>) -> Self {
        self.calls = calls;
        self
    }
}

#[async_trait]
impl SourceBot for ScriptedBot {
    fn source(&self) -> Source {
        self.source
    }

    async fn run(
        &self,
        trip: &RunInput,
        _candidates: &[FlightRecord],
        _credentials: Option<&Credentials>,
        progress: ProgressSink,
    ) -> Result<Vec<FlightRecord>, SourceError> {
        let origin = trip
            .trips
            .first()
            .map(|t| t.origin.clone())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push(format!("start {} {origin}", self.source.name()));

        progress.update(40, "running");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SourceError::Failed("login rejected".to_string()));
        }
        progress.update(100, "done");
        self.calls
            .lock()
            .unwrap()
            .push(format!("end {} {origin}", self.source.name()));
        Ok(self.records.clone())
    }
}

fn portal_flight(number: &str, load: LoadClass, selectable: bool) -> FlightRecord {
    let mut record = FlightRecord::new(number, Source::SchedulePortal);
    record.airline_name = "United".to_string();
    record.origin = "SFO".to_string();
    record.destination = "FRA".to_string();
    record.departure_time = "08:00".to_string();
    record.duration_minutes = 660;
    record.selectable = selectable;
    record.seats.portal_load = Some(load);
    record
}

fn fare_flight(number: &str, seats: &str) -> FlightRecord {
    let mut record = FlightRecord::new(number, Source::FareSearch);
    record
        .seats
        .public_seats
        .insert(Cabin::Economy, seats.to_string());
    record
}

fn peer_flight(number: &str, bucket: &str, seats: &str) -> FlightRecord {
    let mut record = FlightRecord::new(number, Source::PeerLoads);
    record
        .seats
        .peer_seats
        .insert(bucket.to_string(), seats.to_string());
    record
}

fn valid_input(origin: &str) -> RunInput {
    RunInput {
        flight_type: "one-way".to_string(),
        travel_status: "Standby (R1)".to_string(),
        trips: vec![TripLeg {
            origin: origin.to_string(),
            destination: "FRA".to_string(),
        }],
        itinerary: vec![ItineraryLeg {
            date: "03/14/2025".to_string(),
            time: "08:00".to_string(),
            class: "Economy".to_string(),
        }],
        traveller: vec![Traveller {
            name: "Jane Doe".to_string(),
            salutation: "MS".to_string(),
            checked: Some(true),
        }],
        account_id: Some(1),
        ..Default::default()
    }
}

fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .upsert_primary_account(1, "Jane Doe", "jane", "hunter2")
        .unwrap();
    store.upsert_peer_account("Jane Doe", "jdoe", "s3cret").unwrap();
    Arc::new(store)
}

fn orchestrator(store: Arc<SqliteStore>, bots: Vec<Arc<dyn SourceBot>>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(RunRegistry::new()),
        store,
        bots,
        Ranker::heuristic_only(),
    )
    .with_bot_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn test_happy_path_merges_all_sources() {
    let store = seeded_store();
    let bots: Vec<Arc<dyn SourceBot>> = vec![
        Arc::new(ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("ua 123", LoadClass::Mid, true)],
        )),
        Arc::new(ScriptedBot::new(
            Source::FareSearch,
            vec![fare_flight("UA0123", "4")],
        )),
        Arc::new(ScriptedBot::new(
            Source::PeerLoads,
            vec![peer_flight("UA123", "eco", "6")],
        )),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    assert_eq!(handle.status(), RunStatus::Completed);

    let payload = store.get_latest_result(handle.id()).unwrap().unwrap();
    let flights = payload["flights"].as_array().unwrap();
    assert_eq!(flights.len(), 1);
    let flight = &flights[0];
    assert_eq!(flight["flight_number"], "UA123");
    assert_eq!(flight["seats"]["public_seats"]["economy"], "4");
    assert_eq!(flight["seats"]["peer_seats"]["eco"], "6");
    let sources = flight["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 3);
    assert_eq!(flight["rank"], 1);

    // Stored run record reached the same terminal status
    let run = store.get_run(handle.id()).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn test_no_selectable_flights_is_literal_error() {
    let store = seeded_store();
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(ScriptedBot::new(
        Source::SchedulePortal,
        vec![portal_flight("UA123", LoadClass::High, false)],
    ))];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    let run = handle.snapshot();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error.as_deref(), Some("no selectable flights"));
}

#[tokio::test]
async fn test_primary_failure_is_fatal() {
    let store = seeded_store();
    let bots: Vec<Arc<dyn SourceBot>> =
        vec![Arc::new(ScriptedBot::failing(Source::SchedulePortal))];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    let run = handle.snapshot();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error.as_deref(), Some("login rejected"));
}

#[tokio::test]
async fn test_secondary_timeouts_still_complete() {
    let store = seeded_store();
    let bots: Vec<Arc<dyn SourceBot>> = vec![
        Arc::new(ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("UA123", LoadClass::High, true)],
        )),
        // Both secondaries exceed the 200ms bot timeout
        Arc::new(ScriptedBot::hanging(
            Source::FareSearch,
            Duration::from_secs(5),
        )),
        Arc::new(ScriptedBot::hanging(
            Source::PeerLoads,
            Duration::from_secs(5),
        )),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    assert_eq!(handle.status(), RunStatus::Completed);

    let payload = store.get_latest_result(handle.id()).unwrap().unwrap();
    let flight = &payload["flights"].as_array().unwrap()[0];
    // Only the surviving source's fields are populated
    assert_eq!(flight["seats"]["portal_load"], "HIGH");
    assert!(flight["seats"].get("public_seats").is_none());
    assert!(flight["seats"].get("peer_seats").is_none());
    assert_eq!(flight["sources"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_input_never_invokes_bots() {
    let store = seeded_store();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(
        ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("UA123", LoadClass::High, true)],
        )
        .with_call_log(Arc::clone(&calls)),
    )];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let mut input = valid_input("SFO");
    input.itinerary.clear();
    let handle = orchestrator.submit(input).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    let run = handle.snapshot();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error.as_deref(), Some("invalid input"));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_fails_before_bots() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap()); // no accounts
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(
        ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("UA123", LoadClass::High, true)],
        )
        .with_call_log(Arc::clone(&calls)),
    )];
    let orchestrator = Orchestrator::new(
        Arc::new(RunRegistry::new()),
        store,
        bots,
        Ranker::heuristic_only(),
    );

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    let run = handle.snapshot();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(
        run.error.as_deref(),
        Some("missing schedule_portal credentials")
    );
    assert!(calls.lock().unwrap().is_empty());
}

/// Secondary bot that records the candidate set it was handed
struct CandidateRecordingBot {
    source: Source,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SourceBot for CandidateRecordingBot {
    fn source(&self) -> Source {
        self.source
    }

    async fn run(
        &self,
        _trip: &RunInput,
        candidates: &[FlightRecord],
        _credentials: Option<&Credentials>,
        _progress: ProgressSink,
    ) -> Result<Vec<FlightRecord>, SourceError> {
        let mut seen = self.seen.lock().unwrap();
        *seen = candidates.iter().map(|f| f.flight_number.clone()).collect();
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_secondary_bots_receive_selectable_candidates() {
    let store = seeded_store();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let bots: Vec<Arc<dyn SourceBot>> = vec![
        Arc::new(ScriptedBot::new(
            Source::SchedulePortal,
            vec![
                portal_flight("UA123", LoadClass::High, true),
                portal_flight("UA456", LoadClass::Mid, true),
                portal_flight("UA789", LoadClass::Low, false),
            ],
        )),
        Arc::new(CandidateRecordingBot {
            source: Source::PeerLoads,
            seen: Arc::clone(&seen),
        }),
    ];
    let orchestrator = orchestrator(Arc::clone(&store), bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    assert_eq!(handle.status(), RunStatus::Completed);
    // The peer bot saw exactly the primary's selectable flights, so it
    // can post load requests for candidates without a report
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["UA123".to_string(), "UA456".to_string()]
    );
}

/// Store whose primary-account lookup fails at the database layer
struct FailingAccountStore(SqliteStore);

impl Store for FailingAccountStore {
    fn create_run(&self, run: &globalpass::domain::Run) -> Result<(), StoreError> {
        self.0.create_run(run)
    }

    fn update_run(&self, run: &globalpass::domain::Run) -> Result<(), StoreError> {
        self.0.update_run(run)
    }

    fn get_run(&self, id: &RunId) -> Result<Option<globalpass::domain::Run>, StoreError> {
        self.0.get_run(id)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<globalpass::domain::Run>, StoreError> {
        self.0.list_runs(limit)
    }

    fn save_aggregated_result(
        &self,
        run_id: &RunId,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.0.save_aggregated_result(run_id, payload)
    }

    fn get_latest_result(&self, run_id: &RunId) -> Result<Option<serde_json::Value>, StoreError> {
        self.0.get_latest_result(run_id)
    }

    fn primary_account(&self, _account_id: i64) -> Result<Option<PrimaryAccount>, StoreError> {
        Err(StoreError::Database(rusqlite::Error::InvalidQuery))
    }

    fn peer_account(&self, employee_name: &str) -> Result<Option<Credentials>, StoreError> {
        self.0.peer_account(employee_name)
    }
}

#[tokio::test]
async fn test_account_lookup_failure_stops_run_before_bots() {
    let store = Arc::new(FailingAccountStore(SqliteStore::open_in_memory().unwrap()));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(
        ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("UA123", LoadClass::High, true)],
        )
        .with_call_log(Arc::clone(&calls)),
    )];
    let orchestrator = Orchestrator::new(
        Arc::new(RunRegistry::new()),
        store,
        bots,
        Ranker::heuristic_only(),
    );

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    orchestrator.execute(Arc::clone(&handle)).await;

    let run = handle.snapshot();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(
        run.error.as_deref(),
        Some("missing schedule_portal credentials")
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_back_to_back_runs_are_serialized() {
    let store = seeded_store();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(
        ScriptedBot::new(
            Source::SchedulePortal,
            vec![portal_flight("UA123", LoadClass::High, true)],
        )
        .with_delay(Duration::from_millis(50))
        .with_call_log(Arc::clone(&calls)),
    )];
    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(RunRegistry::new()),
            store,
            bots,
            Ranker::heuristic_only(),
        )
        .with_bot_timeout(Duration::from_secs(5)),
    );

    let first = orchestrator.submit(valid_input("AAA")).unwrap();
    let second = orchestrator.submit(valid_input("BBB")).unwrap();

    let t1 = {
        let orchestrator = Arc::clone(&orchestrator);
        let first = Arc::clone(&first);
        tokio::spawn(async move { orchestrator.execute(first).await })
    };
    // Give the first run a head start on the slot
    tokio::time::sleep(Duration::from_millis(10)).await;
    let t2 = {
        let orchestrator = Arc::clone(&orchestrator);
        let second = Arc::clone(&second);
        tokio::spawn(async move { orchestrator.execute(second).await })
    };
    t1.await.unwrap();
    t2.await.unwrap();

    assert_eq!(first.status(), RunStatus::Completed);
    assert_eq!(second.status(), RunStatus::Completed);

    // The second run's bot work may only start after the first run's
    // bot work fully finished
    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            "start schedule_portal AAA".to_string(),
            "end schedule_portal AAA".to_string(),
            "start schedule_portal BBB".to_string(),
            "end schedule_portal BBB".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_observer_sees_history_and_terminal_status() {
    let store = seeded_store();
    let bots: Vec<Arc<dyn SourceBot>> = vec![Arc::new(ScriptedBot::new(
        Source::SchedulePortal,
        vec![portal_flight("UA123", LoadClass::High, true)],
    ))];
    let orchestrator = orchestrator(store, bots);

    let handle = orchestrator.submit(valid_input("SFO")).unwrap();
    let mut sub = handle.subscribe();

    orchestrator.execute(Arc::clone(&handle)).await;

    // Live stream contains a running status, bot progress, and ends
    // with a terminal status
    let mut saw_running = false;
    let mut saw_progress = false;
    let mut terminal = None;
    while let Ok(event) = sub.events.try_recv() {
        match event {
            ProgressEvent::Status {
                status: RunStatus::Running,
                ..
            } => saw_running = true,
            ProgressEvent::Progress { .. } => saw_progress = true,
            ProgressEvent::Status { status, .. } if status.is_terminal() => {
                terminal = Some(status)
            }
            _ => {}
        }
    }
    assert!(saw_running);
    assert!(saw_progress);
    assert_eq!(terminal, Some(RunStatus::Completed));

    // A late subscriber replays the buffered log history
    let late = handle.subscribe();
    assert!(late
        .history
        .iter()
        .any(|e| matches!(e, ProgressEvent::Log { message, .. } if message == "Run finished.")));
}
