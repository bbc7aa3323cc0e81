use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::portal::Credentials;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub portal_url: String,
    pub credentials: Credentials,
    pub term: String,
    pub max_attempts: u32,
    pub delay_seconds: u64,
    pub registration_timeout: Duration,
    pub scrape_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub auto_start_monitor: bool,
}

impl Config {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
        };

        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://seatwatch.db?mode=rwc".to_string());

        Ok(Self {
            database_url,
            portal_url: required("PORTAL_URL")?,
            credentials: Credentials {
                username: required("PORTAL_USERNAME")?,
                password: required("PORTAL_PASSWORD")?,
            },
            term: required("PORTAL_TERM")?,
            max_attempts: parse_or(&lookup, "MONITOR_MAX_ATTEMPTS", 100)?,
            delay_seconds: parse_or(&lookup, "MONITOR_DELAY_SECS", 30)?,
            registration_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REGISTRATION_TIMEOUT_SECS",
                10,
            )?),
            scrape_timeout: Duration::from_secs(parse_or(&lookup, "SCRAPE_TIMEOUT_SECS", 30)?),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            auto_start_monitor: parse_or(&lookup, "AUTO_START_MONITOR", false)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e))),
        _ => Ok(default),
    }
}
