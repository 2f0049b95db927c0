use std::{env, num::NonZeroUsize, path::PathBuf, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
    address_column: String,
    batch_size: NonZeroUsize,
    worker_count: NonZeroUsize,
    job_concurrency: NonZeroUsize,
    queue_poll_interval: Duration,
    primary_pace: Duration,
    secondary_pace: Duration,
    primary_timeout: Duration,
    secondary_timeout: Duration,
    connect_timeout: Duration,
    cache_ttl: Duration,
    nominatim_base_url: String,
    nominatim_user_agent: String,
    google_base_url: String,
    google_api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Load the worker configuration from environment variables.
    ///
    /// Every setting has a default; only a value that fails to parse is
    /// an error. The secondary provider is enabled solely by a
    /// non-empty `GOOGLE_API_KEY`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a numeric value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upload_dir = PathBuf::from(
            env::var("GEOCODER_UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
        );
        let processed_dir = PathBuf::from(
            env::var("GEOCODER_PROCESSED_DIR").unwrap_or_else(|_| "processed".to_string()),
        );
        let address_column =
            env::var("GEOCODER_ADDRESS_COLUMN").unwrap_or_else(|_| "FULL_ADDRESS".to_string());

        let batch_size = parse_non_zero_usize("GEOCODER_BATCH_SIZE", 8)?;
        let worker_count = parse_non_zero_usize("GEOCODER_WORKER_COUNT", 2)?;
        let job_concurrency = parse_non_zero_usize("GEOCODER_JOB_CONCURRENCY", 1)?;
        let queue_poll_interval = parse_duration_ms("GEOCODER_QUEUE_POLL_MS", 500)?;

        // Pacing protects the free provider's usage policy; the paid
        // fallback only needs a token pause.
        let primary_pace = parse_duration_ms("GEOCODER_PRIMARY_PACE_MS", 1000)?;
        let secondary_pace = parse_duration_ms("GEOCODER_SECONDARY_PACE_MS", 100)?;

        let primary_timeout = parse_duration_ms("GEOCODER_PRIMARY_TIMEOUT_MS", 8000)?;
        let secondary_timeout = parse_duration_ms("GEOCODER_SECONDARY_TIMEOUT_MS", 8000)?;
        let connect_timeout = parse_duration_ms("GEOCODER_CONNECT_TIMEOUT_MS", 3000)?;

        let cache_ttl =
            Duration::from_secs(parse_u64("GEOCODER_CACHE_TTL_SECS", 30 * SECS_PER_DAY)?);

        let nominatim_base_url = env::var("GEOCODER_NOMINATIM_BASE_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());
        let nominatim_user_agent = env::var("GEOCODER_NOMINATIM_USER_AGENT").unwrap_or_else(|_| {
            format!("geocode-worker/{}", env!("CARGO_PKG_VERSION"))
        });
        let google_base_url = env::var("GEOCODER_GOOGLE_BASE_URL")
            .unwrap_or_else(|_| "https://maps.googleapis.com".to_string());
        let google_api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            upload_dir,
            processed_dir,
            address_column,
            batch_size,
            worker_count,
            job_concurrency,
            queue_poll_interval,
            primary_pace,
            secondary_pace,
            primary_timeout,
            secondary_timeout,
            connect_timeout,
            cache_ttl,
            nominatim_base_url,
            nominatim_user_agent,
            google_base_url,
            google_api_key,
        })
    }

    #[must_use]
    pub fn upload_dir(&self) -> &PathBuf {
        &self.upload_dir
    }

    #[must_use]
    pub fn processed_dir(&self) -> &PathBuf {
        &self.processed_dir
    }

    #[must_use]
    pub fn address_column(&self) -> &str {
        &self.address_column
    }

    #[must_use]
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    #[must_use]
    pub fn worker_count(&self) -> NonZeroUsize {
        self.worker_count
    }

    #[must_use]
    pub fn job_concurrency(&self) -> NonZeroUsize {
        self.job_concurrency
    }

    #[must_use]
    pub fn queue_poll_interval(&self) -> Duration {
        self.queue_poll_interval
    }

    #[must_use]
    pub fn primary_pace(&self) -> Duration {
        self.primary_pace
    }

    #[must_use]
    pub fn secondary_pace(&self) -> Duration {
        self.secondary_pace
    }

    #[must_use]
    pub fn primary_timeout(&self) -> Duration {
        self.primary_timeout
    }

    #[must_use]
    pub fn secondary_timeout(&self) -> Duration {
        self.secondary_timeout
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn nominatim_base_url(&self) -> &str {
        &self.nominatim_base_url
    }

    #[must_use]
    pub fn nominatim_user_agent(&self) -> &str {
        &self.nominatim_user_agent
    }

    #[must_use]
    pub fn google_base_url(&self) -> &str {
        &self.google_base_url
    }

    #[must_use]
    pub fn google_api_key(&self) -> Option<&str> {
        self.google_api_key.as_deref()
    }
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default_ms).map(Duration::from_millis)
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let value = parse_u64(name, default as u64)?;
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be a non-zero positive integer, got {value}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_geocoder_env() {
        for name in [
            "GEOCODER_UPLOAD_DIR",
            "GEOCODER_PROCESSED_DIR",
            "GEOCODER_ADDRESS_COLUMN",
            "GEOCODER_BATCH_SIZE",
            "GEOCODER_WORKER_COUNT",
            "GEOCODER_JOB_CONCURRENCY",
            "GEOCODER_QUEUE_POLL_MS",
            "GEOCODER_PRIMARY_PACE_MS",
            "GEOCODER_SECONDARY_PACE_MS",
            "GEOCODER_PRIMARY_TIMEOUT_MS",
            "GEOCODER_SECONDARY_TIMEOUT_MS",
            "GEOCODER_CONNECT_TIMEOUT_MS",
            "GEOCODER_CACHE_TTL_SECS",
            "GEOCODER_NOMINATIM_BASE_URL",
            "GEOCODER_NOMINATIM_USER_AGENT",
            "GEOCODER_GOOGLE_BASE_URL",
            "GOOGLE_API_KEY",
        ] {
            // SAFETY: test code adjusts deterministic environment state
            // sequentially under ENV_MUTEX.
            unsafe {
                env::remove_var(name);
            }
        }
    }

    #[test]
    fn defaults_match_the_documented_baseline() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        clear_geocoder_env();

        let config = Config::from_env().expect("config loads");

        assert_eq!(config.address_column(), "FULL_ADDRESS");
        assert_eq!(config.batch_size().get(), 8);
        assert_eq!(config.worker_count().get(), 2);
        assert_eq!(config.job_concurrency().get(), 1);
        assert_eq!(config.primary_pace(), Duration::from_millis(1000));
        assert_eq!(config.secondary_pace(), Duration::from_millis(100));
        assert_eq!(config.primary_timeout(), Duration::from_millis(8000));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30 * SECS_PER_DAY));
        assert_eq!(config.google_api_key(), None);
    }

    #[test]
    fn blank_google_key_disables_the_fallback() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        clear_geocoder_env();
        // SAFETY: serialized by ENV_MUTEX.
        unsafe {
            env::set_var("GOOGLE_API_KEY", "   ");
        }

        let config = Config::from_env().expect("config loads");
        assert_eq!(config.google_api_key(), None);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        clear_geocoder_env();
        // SAFETY: serialized by ENV_MUTEX.
        unsafe {
            env::set_var("GEOCODER_BATCH_SIZE", "16");
            env::set_var("GEOCODER_WORKER_COUNT", "4");
            env::set_var("GOOGLE_API_KEY", "real-key");
        }

        let config = Config::from_env().expect("config loads");
        assert_eq!(config.batch_size().get(), 16);
        assert_eq!(config.worker_count().get(), 4);
        assert_eq!(config.google_api_key(), Some("real-key"));

        clear_geocoder_env();
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        clear_geocoder_env();
        // SAFETY: serialized by ENV_MUTEX.
        unsafe {
            env::set_var("GEOCODER_BATCH_SIZE", "0");
        }

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        clear_geocoder_env();
    }
}
