//! Run history and account persistence.
//!
//! SQLite-backed: run records, aggregated result payloads, and the
//! credential tables the orchestrator resolves account references
//! against.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::adapters::Credentials;
use crate::domain::{Run, RunId, RunStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run {0} not found")]
    RunNotFound(RunId),
}

/// Primary-source account row
#[derive(Debug, Clone)]
pub struct PrimaryAccount {
    pub employee_name: String,
    pub credentials: Credentials,
}

/// Persistence collaborator for runs and credentials
pub trait Store: Send + Sync {
    fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Persist the run's current status, error, completion time and
    /// output artifacts
    fn update_run(&self, run: &Run) -> Result<(), StoreError>;

    fn get_run(&self, id: &RunId) -> Result<Option<Run>, StoreError>;

    fn list_runs(&self, limit: usize) -> Result<Vec<Run>, StoreError>;

    fn save_aggregated_result(&self, run_id: &RunId, payload: &Value) -> Result<(), StoreError>;

    fn get_latest_result(&self, run_id: &RunId) -> Result<Option<Value>, StoreError>;

    /// Resolve primary-source credentials from an account reference
    fn primary_account(&self, account_id: i64) -> Result<Option<PrimaryAccount>, StoreError>;

    /// Peer-network credentials are keyed by the employee name on the
    /// primary account
    fn peer_account(&self, employee_name: &str) -> Result<Option<Credentials>, StoreError>;
}

/// SQLite implementation of the store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                error TEXT,
                input_json TEXT NOT NULL,
                outputs_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS results (
                run_id TEXT NOT NULL REFERENCES runs(id),
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                employee_name TEXT NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS peer_accounts (
                employee_name TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password TEXT NOT NULL
            );
            "#,
        )?;
        debug!("store schema initialized");
        Ok(())
    }

    /// Insert or replace a primary account (used by `init-db` and tests)
    pub fn upsert_primary_account(
        &self,
        id: i64,
        employee_name: &str,
        username: &str,
        password: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO accounts (id, employee_name, username, password)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, employee_name, username, password],
        )?;
        Ok(())
    }

    pub fn upsert_peer_account(
        &self,
        employee_name: &str,
        username: &str,
        password: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO peer_accounts (employee_name, username, password)
             VALUES (?1, ?2, ?3)",
            params![employee_name, username, password],
        )?;
        Ok(())
    }

    fn row_to_run(
        id: String,
        status: String,
        error: Option<String>,
        input_json: String,
        outputs_json: String,
        created_at: String,
        completed_at: Option<String>,
    ) -> Result<Run, StoreError> {
        let input = serde_json::from_str(&input_json)?;
        let status = status
            .parse()
            .unwrap_or(RunStatus::Error);
        Ok(Run {
            id: RunId::from(id),
            status,
            input,
            error,
            created_at: created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            completed_at: completed_at.and_then(|s| s.parse::<DateTime<Utc>>().ok()),
            outputs: serde_json::from_str(&outputs_json).unwrap_or_default(),
        })
    }
}

impl Store for SqliteStore {
    fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT INTO runs (id, status, error, input_json, outputs_json, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id.as_str(),
                run.status.as_str(),
                run.error,
                serde_json::to_string(&run.input)?,
                serde_json::to_string(&run.outputs)?,
                run.created_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn update_run(&self, run: &Run) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let changed = conn.execute(
            "UPDATE runs SET status = ?2, error = ?3, outputs_json = ?4, completed_at = ?5
             WHERE id = ?1",
            params![
                run.id.as_str(),
                run.status.as_str(),
                run.error,
                serde_json::to_string(&run.outputs)?,
                run.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::RunNotFound(run.id.clone()));
        }
        Ok(())
    }

    fn get_run(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let row = conn
            .query_row(
                "SELECT id, status, error, input_json, outputs_json, created_at, completed_at
                 FROM runs WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, status, error, input, outputs, created, completed)) => {
                Ok(Some(Self::row_to_run(
                    id, status, error, input, outputs, created, completed,
                )?))
            }
            None => Ok(None),
        }
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, status, error, input_json, outputs_json, created_at, completed_at
             FROM runs ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (id, status, error, input, outputs, created, completed) = row?;
            runs.push(Self::row_to_run(
                id, status, error, input, outputs, created, completed,
            )?);
        }
        Ok(runs)
    }

    fn save_aggregated_result(&self, run_id: &RunId, payload: &Value) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT INTO results (run_id, payload_json, created_at) VALUES (?1, ?2, ?3)",
            params![
                run_id.as_str(),
                serde_json::to_string(payload)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_latest_result(&self, run_id: &RunId) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM results WHERE run_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                params![run_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn primary_account(&self, account_id: i64) -> Result<Option<PrimaryAccount>, StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let row = conn
            .query_row(
                "SELECT employee_name, username, password FROM accounts WHERE id = ?1",
                params![account_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(employee_name, username, password)| PrimaryAccount {
            employee_name,
            credentials: Credentials { username, password },
        }))
    }

    fn peer_account(&self, employee_name: &str) -> Result<Option<Credentials>, StoreError> {
        let conn = self.conn.lock().expect("store poisoned");
        let row = conn
            .query_row(
                "SELECT username, password FROM peer_accounts WHERE employee_name = ?1",
                params![employee_name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(username, password)| Credentials { username, password }))
    }
}
