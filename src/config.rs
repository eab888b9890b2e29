//! Service configuration
//!
//! Settings are read from the process environment (after loading `.env`).

use crate::error::{InsightError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings for the insight pipeline and its collaborators
#[derive(Debug, Clone)]
pub struct Settings {
    /// Superset base URL, e.g. "http://localhost:8088"
    pub superset_base_url: String,
    pub superset_api_key: String,

    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub embedding_model: String,

    /// Chroma server URL
    pub vector_store_url: String,
    /// Collection the training documents live in
    pub vector_store_collection: String,

    pub cache_path: PathBuf,
    pub cache_ttl: Duration,

    pub row_limit: u64,
    pub statement_timeout: Duration,
    /// Fallback execution target when no dataset carries a connection
    pub default_database_url: Option<String>,

    pub server_addr: String,
    pub log_level: String,
}

impl Settings {
    /// Load settings from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| InsightError::Config(format!("{} must be set", key)))
        };

        let default_database_url = get("DEFAULT_DATABASE_URL").or_else(|| postgres_url(&get));

        Ok(Self {
            superset_base_url: required("SUPERSET_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            superset_api_key: required("SUPERSET_API_KEY")?,
            llm_api_key: required("OPENAI_API_KEY")?,
            llm_base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            llm_model: get("LLM_MODEL_NAME").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            llm_max_tokens: parse_or(&get, "LLM_MAX_TOKENS", 1024)?,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            vector_store_url: get("VECTOR_STORE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            vector_store_collection: get("VECTOR_STORE_COLLECTION")
                .unwrap_or_else(|| "dashboard_metadata".to_string()),
            cache_path: get("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/query_cache.db")),
            cache_ttl: Duration::from_secs(parse_or(&get, "CACHE_TTL_SECS", 3600)?),
            row_limit: parse_or(&get, "EXECUTION_ROW_LIMIT", 50)?,
            statement_timeout: Duration::from_secs(parse_or(&get, "EXECUTION_TIMEOUT_SECS", 15)?),
            default_database_url,
            server_addr: get("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| InsightError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Compose a Postgres URL from the discrete POSTGRES_* variables
fn postgres_url<F>(get: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let host = get("POSTGRES_HOST")?;
    let port = get("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
    let db = get("POSTGRES_DB").unwrap_or_else(|| "postgres".to_string());
    let credentials = match (get("POSTGRES_USER"), get("POSTGRES_PASSWORD")) {
        (Some(user), Some(password)) => format!("{}:{}@", user, password),
        (Some(user), None) => format!("{}@", user),
        _ => String::new(),
    };
    Some(format!("postgres://{}{}:{}/{}", credentials, host, port, db))
}
