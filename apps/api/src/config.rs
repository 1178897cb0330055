use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_AI_ENGINE_URL: &str = "http://127.0.0.1:8000";

/// Application configuration loaded from environment variables.
/// Every variable has a default; a present but malformed value fails startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub ai_engine_url: String,
    pub port: u16,
    pub rust_log: String,
    /// How long input stays masked after a proctoring violation.
    pub violation_cooldown: Duration,
    pub ai_request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_engine_url: DEFAULT_AI_ENGINE_URL.to_string(),
            port: 5000,
            rust_log: "info".to_string(),
            violation_cooldown: Duration::from_secs(4),
            ai_request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            ai_engine_url: lookup("AI_ENGINE_URL").unwrap_or(defaults.ai_engine_url),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
            violation_cooldown: Duration::from_secs(parse_var(
                &lookup,
                "VIOLATION_COOLDOWN_SECS",
                defaults.violation_cooldown.as_secs(),
            )?),
            ai_request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "AI_REQUEST_TIMEOUT_SECS",
                defaults.ai_request_timeout.as_secs(),
            )?),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
