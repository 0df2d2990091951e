// Runtime configuration read from the environment (after `.env` is loaded).

use crate::core::rate_limit::RateLimitConfig;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATABASE_URL: &str = "data/comments.db";
const DEFAULT_RECAPTCHA_MIN_SCORE: f64 = 0.5;
const DEFAULT_SWEEP_SECS: u64 = 300;
// Upper bound for every duration setting (one year)
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Where comments are stored.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseConfig {
    /// `DATABASE_URL=memory`
    InMemory,
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    /// Moderation routes answer 401 to everyone while this is unset.
    pub admin_token: Option<String>,
    /// Verification is skipped while this is unset.
    pub recaptcha_secret: Option<String>,
    pub recaptcha_min_score: f64,
    pub comment_policy: RateLimitConfig,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = parse_or(&get, "BIND_ADDR", SocketAddr::from_str(DEFAULT_BIND_ADDR)?)?;

        let database = match get("DATABASE_URL") {
            Some(url) if url.eq_ignore_ascii_case("memory") => DatabaseConfig::InMemory,
            Some(url) => DatabaseConfig::Sqlite(url),
            None => DatabaseConfig::Sqlite(DEFAULT_DATABASE_URL.to_string()),
        };

        let recaptcha_min_score =
            parse_or(&get, "RECAPTCHA_MIN_SCORE", DEFAULT_RECAPTCHA_MIN_SCORE)?;
        if !(0.0..=1.0).contains(&recaptcha_min_score) {
            bail!("RECAPTCHA_MIN_SCORE must be between 0.0 and 1.0, got {recaptcha_min_score}");
        }

        let defaults = RateLimitConfig::comment_policy();
        let max_requests = parse_or(&get, "COMMENT_RATE_MAX", defaults.max_requests)?;
        if max_requests == 0 {
            bail!("COMMENT_RATE_MAX must be at least 1");
        }
        let window_secs = parse_or(&get, "COMMENT_RATE_WINDOW_SECS", defaults.window.as_secs())?;
        if window_secs == 0 {
            bail!("COMMENT_RATE_WINDOW_SECS must be at least 1");
        }
        let block_secs = parse_or(
            &get,
            "COMMENT_RATE_BLOCK_SECS",
            defaults.block_duration.as_secs(),
        )?;

        let sweep_secs = parse_or(&get, "RATE_LIMIT_SWEEP_SECS", DEFAULT_SWEEP_SECS)?;
        if sweep_secs == 0 {
            bail!("RATE_LIMIT_SWEEP_SECS must be at least 1");
        }

        for (key, secs) in [
            ("COMMENT_RATE_WINDOW_SECS", window_secs),
            ("COMMENT_RATE_BLOCK_SECS", block_secs),
            ("RATE_LIMIT_SWEEP_SECS", sweep_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                bail!("{key} must be at most {MAX_DURATION_SECS} seconds, got {secs}");
            }
        }

        Ok(Self {
            bind_addr,
            database,
            admin_token: get("ADMIN_TOKEN"),
            recaptcha_secret: get("RECAPTCHA_SECRET"),
            recaptcha_min_score,
            comment_policy: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
                block_duration: Duration::from_secs(block_secs),
                ..defaults
            },
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
