//! Command-line interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::domain::{RunId, RunInput};
use crate::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "globalpass")]
#[command(about = "Staff-travel flight availability aggregator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a trip-request JSON file without running anything
    Validate {
        /// Path to the input JSON
        input: PathBuf,
    },

    /// Show the status of a run
    Status {
        run_id: String,
    },

    /// Print the latest aggregated result of a run
    Result {
        run_id: String,
    },

    /// List recent runs
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Create the database schema
    InitDb,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Validate { input } => validate(input),
            Commands::Status { run_id } => status(run_id),
            Commands::Result { run_id } => result(run_id),
            Commands::List { limit } => list(limit),
            Commands::InitDb => init_db(),
        }
    }
}

fn open_store() -> Result<SqliteStore> {
    let config = config::load()?;
    if let Some(parent) = config.database.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteStore::open(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))
}

fn validate(path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut input: RunInput =
        serde_json::from_str(&raw).context("input is not valid trip-request JSON")?;

    let problems = input.validate();
    if problems.is_empty() {
        println!("OK: {}", input.route_string());
    } else {
        for problem in &problems {
            eprintln!("{problem}");
        }
        anyhow::bail!("{} validation problem(s)", problems.len());
    }
    Ok(())
}

fn status(run_id: String) -> Result<()> {
    let store = open_store()?;
    let id = RunId::from(run_id);
    let run = store
        .get_run(&id)?
        .with_context(|| format!("run {id} not found"))?;

    println!("run:       {}", run.id);
    println!("status:    {}", run.status.as_str());
    println!("route:     {}", run.input.route_string());
    println!("created:   {}", run.created_at.to_rfc3339());
    if let Some(completed) = run.completed_at {
        println!("completed: {}", completed.to_rfc3339());
    }
    if let Some(error) = run.error {
        println!("error:     {error}");
    }
    Ok(())
}

fn result(run_id: String) -> Result<()> {
    let store = open_store()?;
    let id = RunId::from(run_id);
    let payload = store
        .get_latest_result(&id)?
        .with_context(|| format!("no result stored for run {id}"))?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn list(limit: usize) -> Result<()> {
    let store = open_store()?;
    let runs = store.list_runs(limit)?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:9}  {}",
            run.id,
            run.status.as_str(),
            run.input.route_string()
        );
    }
    Ok(())
}

fn init_db() -> Result<()> {
    // Opening the store creates the schema
    let _store = open_store()?;
    println!("Database initialized.");
    Ok(())
}
