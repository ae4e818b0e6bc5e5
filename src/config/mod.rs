//! Configuration loading and management.
//!
//! The gateway is configured entirely from environment variables, parsed
//! once at startup into an immutable [`Config`]. Any validation failure
//! (missing admin key, interval below the allowed floor, ...) aborts
//! startup with a descriptive error rather than falling back to a guess.

use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const PROD: &str = "prod";
pub const DEV: &str = "dev";

/// Minimum length required for `ADMIN_API_KEY`.
pub const MIN_ADMIN_KEY_LEN: usize = 16;
/// Minimum allowed health-check interval.
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Fully resolved, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub admin_api_key: String,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub auto_deregister_after_failures: bool,
    pub request_timeout: Duration,
    pub idle_chunk_timeout: Duration,
    pub max_retry_attempts: u32,
    pub max_request_body_size: usize,
    pub shutdown_grace: Duration,
    pub log_level: String,
}

/// Config accessors, mirroring the shape of a typed configuration contract.
pub trait ConfigTrait {
    fn is_prod(&self) -> bool;
    fn is_dev(&self) -> bool;
}

impl ConfigTrait for Config {
    fn is_prod(&self) -> bool {
        self.env == PROD
    }

    fn is_dev(&self) -> bool {
        self.env == DEV
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary lookup function; used directly
    /// by `load` and by tests that need an isolated environment.
    pub fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let admin_api_key = get("ADMIN_API_KEY").context(
            "ADMIN_API_KEY is required and must be at least 16 characters",
        )?;
        if admin_api_key.len() < MIN_ADMIN_KEY_LEN {
            bail!(
                "ADMIN_API_KEY must be at least {} characters",
                MIN_ADMIN_KEY_LEN
            );
        }

        let env = get("ENV").unwrap_or_else(|| DEV.to_string());
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", &get, 8000u16)?;
        let database_url = get("DATABASE_URL").unwrap_or_else(|| "gateway.db".to_string());

        let health_check_interval_secs = parse_or("HEALTH_CHECK_INTERVAL_SECONDS", &get, 60u64)?;
        let health_check_interval = Duration::from_secs(health_check_interval_secs);
        if health_check_interval < MIN_HEALTH_CHECK_INTERVAL {
            bail!(
                "HEALTH_CHECK_INTERVAL_SECONDS must be >= {}",
                MIN_HEALTH_CHECK_INTERVAL.as_secs()
            );
        }

        let health_check_timeout =
            Duration::from_secs(parse_or("HEALTH_CHECK_TIMEOUT_SECONDS", &get, 10u64)?);

        let max_consecutive_failures = parse_or("MAX_CONSECUTIVE_FAILURES", &get, 3u32)?;
        if max_consecutive_failures == 0 {
            bail!("MAX_CONSECUTIVE_FAILURES must be >= 1");
        }

        let auto_deregister_after_failures =
            parse_bool_or("AUTO_DEREGISTER_AFTER_FAILURES", &get, true)?;

        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECONDS", &get, 300u64)?);
        let idle_chunk_timeout = Duration::from_secs(60);

        let max_retry_attempts = parse_or("MAX_RETRY_ATTEMPTS", &get, 2u32)?;

        let max_request_body_size = parse_or("MAX_REQUEST_BODY_SIZE", &get, 1_048_576usize)?;

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            env,
            host,
            port,
            database_url,
            admin_api_key,
            health_check_interval,
            health_check_timeout,
            max_consecutive_failures,
            auto_deregister_after_failures,
            request_timeout,
            idle_chunk_timeout,
            max_retry_attempts,
            max_request_body_size,
            shutdown_grace: Duration::from_secs(10),
            log_level,
        })
    }
}

fn parse_or<T>(key: &str, get: &impl Fn(&str) -> Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

fn parse_bool_or(
    key: &str,
    get: &impl Fn(&str) -> Option<String>,
    default: bool,
) -> Result<bool> {
    match get(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => bail!("invalid {}: {}", key, other),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn rejects_missing_admin_key() {
        let err = Config::from_env(env(&[])).unwrap_err();
        assert!(err.to_string().contains("ADMIN_API_KEY"));
    }

    #[test]
    fn rejects_short_admin_key() {
        let err = Config::from_env(env(&[("ADMIN_API_KEY", "short")])).unwrap_err();
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn rejects_interval_below_floor() {
        let err = Config::from_env(env(&[
            ("ADMIN_API_KEY", "abcdefghijklmnop"),
            ("HEALTH_CHECK_INTERVAL_SECONDS", "5"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("HEALTH_CHECK_INTERVAL_SECONDS"));
    }

    #[test]
    fn defaults_applied() {
        let cfg = Config::from_env(env(&[("ADMIN_API_KEY", "abcdefghijklmnop")])).unwrap();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.max_retry_attempts, 2);
        assert_eq!(cfg.max_request_body_size, 1_048_576);
        assert!(cfg.auto_deregister_after_failures);
    }
}
