//! Configuration.
//!
//! Sources (highest priority first):
//! 1. Environment variables (GLOBALPASS_DB, GLOBALPASS_RERANKER_API_KEY,
//!    GLOBALPASS_WEBHOOK_URL)
//! 2. Config file (.globalpass/config.yaml, discovered upwards from the
//!    current directory)
//! 3. Defaults (~/.globalpass)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_RERANKER_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_RERANKER_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BOT_TIMEOUT_SECONDS: u64 = 90;
const DEFAULT_RERANKER_TIMEOUT_SECONDS: u64 = 60;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub bot_timeout_seconds: Option<u64>,

    #[serde(default)]
    pub reranker: Option<RerankerConfig>,

    #[serde(default)]
    pub webhook_url: Option<String>,

    /// "reranker" to enable generative re-ranking, anything else keeps
    /// the heuristic order only
    #[serde(default)]
    pub final_output_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RerankerConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database: PathBuf,
    pub bot_timeout_seconds: u64,
    pub reranker_endpoint: String,
    pub reranker_model: String,
    pub reranker_api_key: String,
    pub reranker_timeout_seconds: u64,
    pub webhook_url: Option<String>,
    pub use_reranker: bool,
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching the current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let candidate = current.join(".globalpass").join("config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".globalpass")
}

pub fn load() -> Result<ResolvedConfig> {
    let config_path = find_config_file();
    let file: ConfigFile = match &config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => ConfigFile::default(),
    };
    resolve(file, config_path)
}

fn resolve(file: ConfigFile, config_path: Option<PathBuf>) -> Result<ResolvedConfig> {
    let base = config_path
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(default_home);

    let database = std::env::var("GLOBALPASS_DB")
        .ok()
        .map(PathBuf::from)
        .or_else(|| file.database.as_ref().map(|p| base.join(p)))
        .unwrap_or_else(|| base.join("globalpass.db"));

    let reranker = file.reranker.unwrap_or_default();
    let reranker_api_key = std::env::var("GLOBALPASS_RERANKER_API_KEY")
        .ok()
        .or(reranker.api_key)
        .unwrap_or_default();

    let webhook_url = std::env::var("GLOBALPASS_WEBHOOK_URL")
        .ok()
        .or(file.webhook_url);

    let use_reranker = file
        .final_output_format
        .as_deref()
        .map(|f| f.eq_ignore_ascii_case("reranker"))
        .unwrap_or(false)
        && !reranker_api_key.is_empty();

    Ok(ResolvedConfig {
        database,
        bot_timeout_seconds: file
            .bot_timeout_seconds
            .unwrap_or(DEFAULT_BOT_TIMEOUT_SECONDS),
        reranker_endpoint: reranker
            .endpoint
            .unwrap_or_else(|| DEFAULT_RERANKER_ENDPOINT.to_string()),
        reranker_model: reranker
            .model
            .unwrap_or_else(|| DEFAULT_RERANKER_MODEL.to_string()),
        reranker_api_key,
        reranker_timeout_seconds: reranker
            .timeout_seconds
            .unwrap_or(DEFAULT_RERANKER_TIMEOUT_SECONDS),
        webhook_url,
        use_reranker,
        config_file: config_path,
    })
}
