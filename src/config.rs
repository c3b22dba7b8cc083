//! Configuration loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DB_PATH: &str = "insights.sqlite";
pub const DEFAULT_UPTIME_ENDPOINT: &str = "https://api.uptimerobot.com/v2/getMonitors";
const DEFAULT_UPTIME_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding the user and conversation mirror
    pub db_path: PathBuf,
    /// UptimeRobot read-only API key; uptime falls back when absent
    pub uptime_api_key: Option<String>,
    pub uptime_endpoint: Url,
    pub uptime_timeout: Duration,
    /// Log directory; logs go to stderr when unset
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let uptime_endpoint = non_empty("UPTIMEROBOT_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_UPTIME_ENDPOINT.to_string());
        let uptime_endpoint = Url::parse(&uptime_endpoint)
            .with_context(|| format!("Invalid UPTIMEROBOT_ENDPOINT: {}", uptime_endpoint))?;

        let uptime_timeout = match non_empty("INSIGHTS_UPTIME_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid INSIGHTS_UPTIME_TIMEOUT_SECS: {}", secs))?,
            None => DEFAULT_UPTIME_TIMEOUT_SECS,
        };

        Ok(Self {
            db_path: non_empty("INSIGHTS_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            uptime_api_key: non_empty("UPTIMEROBOT_API_KEY"),
            uptime_endpoint,
            uptime_timeout: Duration::from_secs(uptime_timeout),
            log_dir: non_empty("INSIGHTS_LOG_DIR").map(PathBuf::from),
        })
    }
}
