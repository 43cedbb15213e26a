//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default canonical storage host. URLs on this host are never re-hosted.
pub const DEFAULT_STORAGE_DOMAIN: &str = "wms.webinfra.cloud";

/// Task queue and worker configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retry budget assigned to new tasks unless the params override it.
    pub max_retries: u32,
    /// Deadline for a single generation call.
    pub generation_timeout: Duration,
    /// Terminal tasks older than this are deleted by the expiry sweep.
    pub retention: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// Unfinished tasks older than this are marked timed out on startup.
    pub recovery_max_age: Duration,
    /// Delay between re-dispatching recovered tasks.
    pub recovery_stagger: Duration,
    /// Capacity of the snapshot write queue.
    pub write_queue_capacity: usize,
    /// Canonical storage host for generated images.
    pub storage_domain: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            generation_timeout: Duration::from_secs(120),
            retention: Duration::from_secs(24 * 3600), // 24 hours
            sweep_interval: Duration::from_secs(3600), // 1 hour
            recovery_max_age: Duration::from_secs(3600),
            recovery_stagger: Duration::from_secs(2),
            write_queue_capacity: 256,
            storage_domain: DEFAULT_STORAGE_DOMAIN.to_string(),
        }
    }
}

impl QueueConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_retries = env_parse("ART_QUEUE_MAX_RETRIES")?.unwrap_or(defaults.max_retries);
        let generation_timeout = env_parse("ART_QUEUE_GENERATION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.generation_timeout);
        let retention = match env_parse("ART_QUEUE_RETENTION_HOURS")? {
            Some(hours) => hours_to_duration("ART_QUEUE_RETENTION_HOURS", hours)?,
            None => defaults.retention,
        };
        let sweep_interval = match env_parse("ART_QUEUE_SWEEP_INTERVAL_SECS")? {
            Some(secs) => non_zero_secs("ART_QUEUE_SWEEP_INTERVAL_SECS", secs)?,
            None => defaults.sweep_interval,
        };
        let write_queue_capacity = env_parse("ART_QUEUE_WRITE_QUEUE_CAPACITY")?
            .unwrap_or(defaults.write_queue_capacity);
        let storage_domain =
            std::env::var("ART_QUEUE_STORAGE_DOMAIN").unwrap_or(defaults.storage_domain);

        if write_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ART_QUEUE_WRITE_QUEUE_CAPACITY".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            max_retries,
            generation_timeout,
            retention,
            sweep_interval,
            write_queue_capacity,
            storage_domain,
            ..defaults
        })
    }
}

/// Connection settings for a live image generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

impl GeneratorConfig {
    /// Returns `None` when no backend is configured or mock mode is forced.
    pub fn from_env() -> Option<Self> {
        if std::env::var("ART_QUEUE_MOCK").is_ok_and(|v| v == "1" || v == "true") {
            return None;
        }
        let base_url = std::env::var("ART_QUEUE_GENERATOR_URL").ok()?;
        let api_key = std::env::var("ART_QUEUE_GENERATOR_API_KEY").unwrap_or_default();
        let model = std::env::var("ART_QUEUE_GENERATOR_MODEL")
            .unwrap_or_else(|_| "seedream-4-0".to_string());

        Some(Self {
            base_url,
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

/// Process-level settings for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Re-hosting endpoint; when absent generated URLs are kept as-is.
    pub storage_url: Option<String>,
    /// Directory for rolling log files; stderr only when absent.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            db_path: PathBuf::from("./data/art-queue.db"),
            storage_url: None,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: env_parse("ART_QUEUE_PORT")?.unwrap_or(defaults.port),
            db_path: std::env::var("ART_QUEUE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            storage_url: std::env::var("ART_QUEUE_STORAGE_URL").ok(),
            log_dir: std::env::var("ART_QUEUE_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn hours_to_duration(key: &str, hours: u64) -> Result<Duration, ConfigError> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{hours} hours is out of range"),
        })
}

fn non_zero_secs(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Read and parse an optional environment variable.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
        assert_eq!(config.retention, Duration::from_secs(86_400));
        assert_eq!(config.sweep_interval, Duration::from_secs(3_600));
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let err = non_zero_secs("ART_QUEUE_SWEEP_INTERVAL_SECS", 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ART_QUEUE_SWEEP_INTERVAL_SECS"));
        assert_eq!(
            non_zero_secs("ART_QUEUE_SWEEP_INTERVAL_SECS", 30).unwrap(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn retention_hours_overflow_rejected() {
        assert_eq!(
            hours_to_duration("ART_QUEUE_RETENTION_HOURS", 48).unwrap(),
            Duration::from_secs(48 * 3600)
        );
        assert!(hours_to_duration("ART_QUEUE_RETENTION_HOURS", u64::MAX).is_err());
    }

    #[test]
    fn env_parse_missing_is_none() {
        let value: Option<u32> = env_parse("ART_QUEUE_TEST_SURELY_UNSET_VAR").unwrap();
        assert!(value.is_none());
    }
}
