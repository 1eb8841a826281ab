use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fieldsync_core::sync::DEFAULT_MAX_BATCH_SIZE;
use fieldsync_core::util::normalize_text_option;
use thiserror::Error;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub max_batch_size: usize,
    pub rate_limit_window: Duration,
    pub sync_batch_rate_limit_per_window: u32,
    pub write_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("max_batch_size", &self.max_batch_size)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_batch_rate_limit_per_window",
                &self.sync_batch_rate_limit_per_window,
            )
            .field(
                "write_rate_limit_per_window",
                &self.write_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FIELDSYNC_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = PathBuf::from(value_or_default(
            &lookup,
            "FIELDSYNC_DATABASE_PATH",
            "fieldsync.db",
        ));

        let jwt_secret = required_trimmed(&lookup, "FIELDSYNC_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "FIELDSYNC_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        let jwt_issuer = normalize_text_option(lookup("FIELDSYNC_JWT_ISSUER"));

        let auth_clock_skew_secs: u64 =
            ranged(&lookup, "AUTH_CLOCK_SKEW_SECS", "60", 0..=300)?;
        let max_batch_size: usize = ranged(
            &lookup,
            "SYNC_MAX_BATCH_SIZE",
            &DEFAULT_MAX_BATCH_SIZE.to_string(),
            1..=1_000,
        )?;
        let rate_limit_window_secs: u64 =
            ranged(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10..=3_600)?;
        let sync_batch_rate_limit_per_window: u32 =
            ranged(&lookup, "SYNC_BATCH_RATE_LIMIT_PER_WINDOW", "30", 1..=1_000)?;
        let write_rate_limit_per_window: u32 =
            ranged(&lookup, "WRITE_RATE_LIMIT_PER_WINDOW", "300", 1..=5_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            max_batch_size,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_batch_rate_limit_per_window,
            write_rate_limit_per_window,
        })
    }
}

/// Parse an integer variable, falling back to `default` and rejecting values outside `range`
fn ranged<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let describe = || format!("{name} must be an integer in [{}, {}]", range.start(), range.end());
    let value = value_or_default(lookup, name, default)
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(describe()))?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(describe()));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    normalize_text_option(lookup(name)).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    normalize_text_option(lookup(name)).ok_or(ConfigError::MissingVar(name))
}
