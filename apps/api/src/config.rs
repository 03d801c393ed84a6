use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::AnalysisSettings;

/// Application configuration loaded from environment variables.
/// Startup fails with a descriptive error if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub analysis: AnalysisSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: optional_env("DATABASE_MAX_CONNECTIONS", 10)?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            analysis: AnalysisSettings {
                min_body_chars: optional_env("ANALYSIS_MIN_BODY_CHARS", 50)?,
                model_call_timeout: Duration::from_secs(optional_env(
                    "MODEL_CALL_TIMEOUT_SECS",
                    300,
                )?),
                streaming: std::env::var("LLM_STREAMING")
                    .map(|v| v != "false" && v != "0")
                    .unwrap_or(true),
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("'{key}' must be a valid number")),
        Err(_) => Ok(default),
    }
}
