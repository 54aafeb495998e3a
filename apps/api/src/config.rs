use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Every variable has a default; only malformed values are errors.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the analysis/rewrite backend.
    pub backend_url: String,
    /// Default TTL of cached values.
    pub cache_ttl_minutes: u64,
    /// TTL of published run artifacts. Raised to `cache_ttl_minutes` if lower.
    pub run_ttl_minutes: u64,
    pub store_path: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            cache_ttl_minutes: 60,
            run_ttl_minutes: 24 * 60,
            store_path: PathBuf::from(".resumeflow/store.json"),
            port: 3000,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, so parsing can be tested without
    /// touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let cache_ttl_minutes = parse_or(&lookup, "CACHE_TTL_MINUTES", defaults.cache_ttl_minutes)?;
        anyhow::ensure!(cache_ttl_minutes > 0, "CACHE_TTL_MINUTES must be positive");
        let run_ttl_minutes =
            parse_or(&lookup, "RUN_TTL_MINUTES", defaults.run_ttl_minutes)?.max(cache_ttl_minutes);

        Ok(Config {
            backend_url: lookup("BACKEND_URL").unwrap_or(defaults.backend_url),
            cache_ttl_minutes,
            run_ttl_minutes,
            store_path: lookup("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_minutes * 60)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
