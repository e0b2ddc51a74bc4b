//! Runtime configuration loaded from the environment (and `.env`).

use crate::db::PoolSettings;
use crate::error::{GatewayError, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the OpenAI-compatible text-generation API.
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    pub query_timeout: Duration,
    pub session_idle_ttl: Duration,
    pub pool_max_connections: u32,
    pub pool_acquire_timeout: Duration,
    /// Example rows per table included in the schema description.
    pub sample_rows: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4".to_string(),
            llm_temperature: 0.0,
            llm_max_tokens: 1000,
            llm_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
            session_idle_ttl: Duration::from_secs(30 * 60),
            pool_max_connections: 5,
            pool_acquire_timeout: Duration::from_secs(30),
            sample_rows: 3,
        }
    }
}

impl GatewayConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            llm_base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: lookup("OPENAI_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature: parse_or(&lookup, "ASKDB_LLM_TEMPERATURE", defaults.llm_temperature)?,
            llm_max_tokens: parse_or(&lookup, "ASKDB_LLM_MAX_TOKENS", defaults.llm_max_tokens)?,
            llm_timeout: secs_or(&lookup, "ASKDB_LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            query_timeout: secs_or(&lookup, "ASKDB_QUERY_TIMEOUT_SECS", defaults.query_timeout)?,
            session_idle_ttl: secs_or(&lookup, "ASKDB_SESSION_IDLE_SECS", defaults.session_idle_ttl)?,
            pool_max_connections: parse_or(
                &lookup,
                "ASKDB_POOL_MAX_CONNECTIONS",
                defaults.pool_max_connections,
            )?,
            pool_acquire_timeout: secs_or(
                &lookup,
                "ASKDB_POOL_ACQUIRE_TIMEOUT_SECS",
                defaults.pool_acquire_timeout,
            )?,
            sample_rows: parse_or(&lookup, "ASKDB_SAMPLE_ROWS", defaults.sample_rows)?,
        })
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.pool_max_connections,
            acquire_timeout: self.pool_acquire_timeout,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::Config(format!("{key} has an invalid value: '{raw}'"))),
        _ => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
