use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use courier_core::DEFAULT_MAX_RETRIES;
use courier_sync::DEFAULT_PROVIDER_URL;

/// Process configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub provider_url: String,
    pub provider_timeout: Duration,
    pub outbox_batch_size: u32,
    pub outbox_poll_interval: Duration,
    pub outbox_max_retries: u32,
    /// Run an outbox worker inside the server process.
    pub run_worker: bool,
    /// Periodic sync interval; `None` disables it.
    pub sync_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("COURIER_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://courier.db".to_string());

        let listen_addr = parse(
            &lookup,
            "COURIER_LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
            "must be a valid socket address",
        )?;

        let provider_url =
            lookup("COURIER_PROVIDER_URL").unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());

        let provider_timeout_secs: u64 = parse(
            &lookup,
            "COURIER_PROVIDER_TIMEOUT_SECS",
            30,
            "must be a number of seconds",
        )?;
        if provider_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "COURIER_PROVIDER_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }

        let outbox_batch_size: u32 = parse(
            &lookup,
            "COURIER_OUTBOX_BATCH_SIZE",
            100,
            "must be a positive integer",
        )?;
        if outbox_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "COURIER_OUTBOX_BATCH_SIZE",
                "must be greater than zero",
            ));
        }

        let outbox_poll_interval_secs: u64 = parse(
            &lookup,
            "COURIER_OUTBOX_POLL_INTERVAL_SECS",
            1,
            "must be a number of seconds",
        )?;

        let outbox_max_retries = parse(
            &lookup,
            "COURIER_OUTBOX_MAX_RETRIES",
            DEFAULT_MAX_RETRIES,
            "must be a non-negative integer",
        )?;

        let run_worker = match lookup("COURIER_RUN_WORKER") {
            None => false,
            Some(raw) => parse_bool(&raw)
                .ok_or(ConfigError::Invalid("COURIER_RUN_WORKER", "must be true or false"))?,
        };

        let sync_interval_secs: u64 = parse(
            &lookup,
            "COURIER_SYNC_INTERVAL_SECS",
            0,
            "must be a number of seconds",
        )?;

        Ok(Config {
            database_url,
            listen_addr,
            provider_url,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            outbox_batch_size,
            outbox_poll_interval: Duration::from_secs(outbox_poll_interval_secs),
            outbox_max_retries,
            run_worker,
            sync_interval: (sync_interval_secs > 0).then(|| Duration::from_secs(sync_interval_secs)),
        })
    }
}

fn parse<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, expected)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
