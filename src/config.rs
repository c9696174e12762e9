// ⚙️ Configuration - environment variables with defaults
//
//   EXIT_WATCH_DB_PATH            SQLite file (default: tor_exit_nodes.db)
//   EXIT_WATCH_BIND_ADDR          listen address (default: 0.0.0.0:8080)
//   EXIT_WATCH_FEED_URL           exit-node feed
//   EXIT_WATCH_LOOKUP_URL         country lookup base URL
//   EXIT_WATCH_REFRESH_SECS       ingestion interval (default: 3600)
//   EXIT_WATCH_HTTP_TIMEOUT_SECS  upstream request timeout (default: 30)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::DEFAULT_REFRESH_INTERVAL;
use crate::sources::{DEFAULT_FEED_URL, DEFAULT_LOOKUP_URL};

pub const DEFAULT_DB_PATH: &str = "tor_exit_nodes.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub feed_url: String,
    pub lookup_url: String,
    pub refresh_interval: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("EXIT_WATCH_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(addr) = get("EXIT_WATCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(url) = get("EXIT_WATCH_FEED_URL") {
            config.feed_url = url;
        }
        if let Some(url) = get("EXIT_WATCH_LOOKUP_URL") {
            config.lookup_url = url;
        }
        if let Some(raw) = get("EXIT_WATCH_REFRESH_SECS") {
            config.refresh_interval = parse_secs("EXIT_WATCH_REFRESH_SECS", &raw)?;
        }
        if let Some(raw) = get("EXIT_WATCH_HTTP_TIMEOUT_SECS") {
            config.http_timeout = parse_secs("EXIT_WATCH_HTTP_TIMEOUT_SECS", &raw)?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, raw))?;

    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }

    Ok(Duration::from_secs(secs))
}
