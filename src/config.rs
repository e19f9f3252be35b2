use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_KEEP_TRANSACTIONS_FOR: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_CLEANER_INTERVAL: Duration = Duration::from_secs(3600);
const MAX_CLEANER_INTERVAL: Duration = Duration::from_secs(365 * 86_400);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

/// Cleaner settings: how long transactions are kept and how often the sweep runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    pub keep_transactions_for: Duration,
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_transactions_for: DEFAULT_KEEP_TRANSACTIONS_FOR,
            interval: DEFAULT_CLEANER_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub retention: RetentionConfig,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS '{}'", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let keep_transactions_for = match lookup("CLEANER_KEEP_TRANSACTIONS_FOR") {
            Some(raw) => parse_duration(&raw)
                .with_context(|| format!("invalid CLEANER_KEEP_TRANSACTIONS_FOR '{}'", raw))?,
            None => DEFAULT_KEEP_TRANSACTIONS_FOR,
        };

        let interval = match lookup("CLEANER_INTERVAL") {
            Some(raw) => parse_duration(&raw)
                .with_context(|| format!("invalid CLEANER_INTERVAL '{}'", raw))?,
            None => DEFAULT_CLEANER_INTERVAL,
        };
        if interval.is_zero() {
            anyhow::bail!("CLEANER_INTERVAL must be greater than zero");
        }
        if interval > MAX_CLEANER_INTERVAL {
            anyhow::bail!(
                "CLEANER_INTERVAL must be at most {}d",
                MAX_CLEANER_INTERVAL.as_secs() / 86_400
            );
        }

        let log_format = lookup("LOG_FORMAT")
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            database_url,
            database_max_connections,
            retention: RetentionConfig {
                keep_transactions_for,
                interval,
            },
            log_format,
        })
    }
}

/// Parses `90`, `90s`, `15m`, `24h` or `7d`. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let value = raw.trim();
    let (digits, unit_secs) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 3600),
        Some((idx, 'd')) => (&value[..idx], 86_400),
        Some(_) => (value, 1),
        None => anyhow::bail!("duration is empty"),
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a whole number", digits))?;

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .context("duration overflows")
}
