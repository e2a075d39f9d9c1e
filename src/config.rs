//! Configuration for the buffered sink.
//!
//! Settings come from environment variables with validated defaults.
//! The engine itself only needs the [`HandlerConfig`] subset; the rest
//! selects and configures the destination.

use std::env;
use std::time::Duration;

use crate::handler::HandlerConfig;

/// Default seconds between time-based flushes
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 10;

/// Default number of entries that triggers a size-based flush
const DEFAULT_FLUSH_CAPACITY: usize = 10;

/// Default eviction threshold
const DEFAULT_MAX_BUFFER_ENTRIES: usize = 100;

const DEFAULT_HTTP_ENDPOINT: &str = "http://localhost:8000/logs";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_MAX_RETRIES: u32 = 3;

const MIN_FLUSH_INTERVAL_SECS: u64 = 1;

const MAX_FLUSH_INTERVAL_SECS: u64 = 3_600;

const MAX_FLUSH_CAPACITY: usize = 100_000;

const MAX_BUFFER_ENTRIES_LIMIT: usize = 1_000_000;

/// Where flushed batches are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// Print each batch to stdout
    Console,

    /// POST each batch as JSON
    Http,
}

impl std::str::FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(DestinationKind::Console),
            "http" => Ok(DestinationKind::Http),
            other => Err(format!(
                "'{}' is not a known destination (expected 'console' or 'http')",
                other
            )),
        }
    }
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::Console => write!(f, "console"),
            DestinationKind::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the buffered sink.
///
/// All settings can be configured via environment variables:
/// - `BUFFERED_SINK_FLUSH_INTERVAL_SECS`: Seconds between flushes (default: 10)
/// - `BUFFERED_SINK_FLUSH_CAPACITY`: Entries that trigger a flush (default: 10)
/// - `BUFFERED_SINK_MAX_BUFFER_ENTRIES`: Entries kept before evicting (default: 100)
/// - `BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS`: Give up draining after this long (default: wait forever)
/// - `BUFFERED_SINK_DESTINATION`: `console` or `http` (default: console)
/// - `BUFFERED_SINK_HTTP_ENDPOINT`: URL batches are POSTed to
/// - `BUFFERED_SINK_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `BUFFERED_SINK_MAX_RETRIES`: HTTP retries per batch (default: 3)
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time between flushes
    pub flush_interval: Duration,

    /// Number of buffered entries that triggers a flush
    pub flush_capacity: usize,

    /// Entries held before the oldest is evicted
    pub max_buffer_entries: usize,

    /// Upper bound on how long shutdown waits for the drain
    pub shutdown_timeout: Option<Duration>,

    pub destination: DestinationKind,

    pub http_endpoint: String,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Maximum number of retry attempts for failed requests
    pub max_retries: u32,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric setting is not a number or is out of
    /// range, or if the destination is unknown. A max buffer size below the
    /// flush capacity is accepted; the monitor then flushes on interval only.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use buffered_sink::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Flushing every {:?}", config.flush_interval);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let flush_interval_secs = parse_bounded(
            "BUFFERED_SINK_FLUSH_INTERVAL_SECS",
            DEFAULT_FLUSH_INTERVAL_SECS,
            MIN_FLUSH_INTERVAL_SECS,
            MAX_FLUSH_INTERVAL_SECS,
        )?;

        let flush_capacity = parse_bounded(
            "BUFFERED_SINK_FLUSH_CAPACITY",
            DEFAULT_FLUSH_CAPACITY,
            1,
            MAX_FLUSH_CAPACITY,
        )?;

        let max_buffer_entries = parse_bounded(
            "BUFFERED_SINK_MAX_BUFFER_ENTRIES",
            DEFAULT_MAX_BUFFER_ENTRIES,
            1,
            MAX_BUFFER_ENTRIES_LIMIT,
        )?;

        let shutdown_timeout = Self::parse_shutdown_timeout()?;

        let destination = match env::var("BUFFERED_SINK_DESTINATION") {
            Ok(value) => value
                .parse::<DestinationKind>()
                .map_err(|e: String| ConfigError::for_var("BUFFERED_SINK_DESTINATION", e))?,
            Err(_) => DestinationKind::Console,
        };

        let http_endpoint = env::var("BUFFERED_SINK_HTTP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_HTTP_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        // Transport tuning is optional; bad values fall back to defaults
        let request_timeout_secs: u64 = env::var("BUFFERED_SINK_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_retries: u32 = env::var("BUFFERED_SINK_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Ok(Self {
            flush_interval: Duration::from_secs(flush_interval_secs),
            flush_capacity,
            max_buffer_entries,
            shutdown_timeout,
            destination,
            http_endpoint,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_retries,
        })
    }

    fn parse_shutdown_timeout() -> Result<Option<Duration>, ConfigError> {
        let env_var = "BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS";

        match env::var(env_var) {
            Ok(value) => {
                let secs: u64 = value.parse().map_err(|_| {
                    ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))
                })?;
                if secs == 0 {
                    return Err(ConfigError::for_var(
                        env_var,
                        "shutdown timeout must be greater than 0",
                    ));
                }
                Ok(Some(Duration::from_secs(secs)))
            }
            Err(_) => Ok(None),
        }
    }

    /// The settings the buffering engine needs.
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            flush_interval: self.flush_interval,
            flush_capacity: self.flush_capacity,
            max_buffer_entries: self.max_buffer_entries,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

/// Parse a numeric variable, falling back to `default` when it is unset.
fn parse_bounded<T>(env_var: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let value = match env::var(env_var) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };

    let parsed: T = value.trim().parse().map_err(|_| {
        ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))
    })?;

    if parsed < min {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} is below minimum ({})", parsed, min),
        ));
    }

    if parsed > max {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} exceeds maximum ({})", parsed, max),
        ));
    }

    Ok(parsed)
}

impl Default for Config {
    /// Create a default configuration without reading the environment.
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            flush_capacity: DEFAULT_FLUSH_CAPACITY,
            max_buffer_entries: DEFAULT_MAX_BUFFER_ENTRIES,
            shutdown_timeout: None,
            destination: DestinationKind::Console,
            http_endpoint: DEFAULT_HTTP_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    /// Tests in this module share process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    const ALL_VARS: &[&str] = &[
        "BUFFERED_SINK_FLUSH_INTERVAL_SECS",
        "BUFFERED_SINK_FLUSH_CAPACITY",
        "BUFFERED_SINK_MAX_BUFFER_ENTRIES",
        "BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS",
        "BUFFERED_SINK_DESTINATION",
        "BUFFERED_SINK_HTTP_ENDPOINT",
        "BUFFERED_SINK_REQUEST_TIMEOUT_SECS",
        "BUFFERED_SINK_MAX_RETRIES",
    ];

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn remove(key: &str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clean_env() -> Vec<EnvGuard> {
        ALL_VARS.iter().map(|var| EnvGuard::remove(var)).collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.flush_capacity, 10);
        assert_eq!(config.max_buffer_entries, 100);
        assert_eq!(config.shutdown_timeout, None);
        assert_eq!(config.destination, DestinationKind::Console);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = env_lock();
        let _guards = clean_env();

        let config = Config::from_env().expect("Should load with defaults");
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.flush_capacity, 10);
        assert_eq!(config.max_buffer_entries, 100);
        assert_eq!(config.http_endpoint, "http://localhost:8000/logs");
    }

    #[test]
    fn test_config_from_env_custom_values() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _g1 = EnvGuard::set("BUFFERED_SINK_FLUSH_INTERVAL_SECS", "5");
        let _g2 = EnvGuard::set("BUFFERED_SINK_FLUSH_CAPACITY", "5");
        let _g3 = EnvGuard::set("BUFFERED_SINK_MAX_BUFFER_ENTRIES", "200");
        let _g4 = EnvGuard::set("BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS", "15");
        let _g5 = EnvGuard::set("BUFFERED_SINK_DESTINATION", "HTTP");
        let _g6 = EnvGuard::set("BUFFERED_SINK_HTTP_ENDPOINT", "http://collector:9000/ingest/");

        let config = Config::from_env().expect("Should load custom values");
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.flush_capacity, 5);
        assert_eq!(config.max_buffer_entries, 200);
        assert_eq!(config.shutdown_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.destination, DestinationKind::Http);
        assert_eq!(config.http_endpoint, "http://collector:9000/ingest"); // Trailing slash removed
    }

    #[test]
    fn test_invalid_flush_capacity() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _guard = EnvGuard::set("BUFFERED_SINK_FLUSH_CAPACITY", "lots");

        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("not a valid number"));
        assert_eq!(err.env_var.as_deref(), Some("BUFFERED_SINK_FLUSH_CAPACITY"));
    }

    #[test]
    fn test_zero_flush_capacity() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _guard = EnvGuard::set("BUFFERED_SINK_FLUSH_CAPACITY", "0");

        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn test_flush_interval_bounds() {
        let _lock = env_lock();
        let _guards = clean_env();

        {
            let _guard = EnvGuard::set("BUFFERED_SINK_FLUSH_INTERVAL_SECS", "0");
            let err = Config::from_env().unwrap_err();
            assert!(err.message.contains("below minimum"));
        }

        let _guard = EnvGuard::set("BUFFERED_SINK_FLUSH_INTERVAL_SECS", "99999");
        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("exceeds maximum"));
    }

    #[test]
    fn test_max_buffer_below_capacity() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _g1 = EnvGuard::set("BUFFERED_SINK_FLUSH_CAPACITY", "50");
        let _g2 = EnvGuard::set("BUFFERED_SINK_MAX_BUFFER_ENTRIES", "20");

        // Accepted: flushing falls back to the interval alone
        let config = Config::from_env().unwrap();
        assert_eq!(config.flush_capacity, 50);
        assert_eq!(config.max_buffer_entries, 20);
    }

    #[test]
    fn test_zero_shutdown_timeout() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _guard = EnvGuard::set("BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("greater than 0"));
    }

    #[test]
    fn test_unknown_destination() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _guard = EnvGuard::set("BUFFERED_SINK_DESTINATION", "kafka");

        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("not a known destination"));
    }

    #[test]
    fn test_invalid_transport_settings_fall_back() {
        let _lock = env_lock();
        let _guards = clean_env();
        let _g1 = EnvGuard::set("BUFFERED_SINK_REQUEST_TIMEOUT_SECS", "soon");
        let _g2 = EnvGuard::set("BUFFERED_SINK_MAX_RETRIES", "-1");

        let config = Config::from_env().unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_handler_config_projection() {
        let config = Config {
            flush_capacity: 5,
            flush_interval: Duration::from_secs(5),
            shutdown_timeout: Some(Duration::from_secs(2)),
            ..Config::default()
        };

        let handler = config.handler_config();
        assert_eq!(handler.flush_capacity, 5);
        assert_eq!(handler.flush_interval, Duration::from_secs(5));
        assert_eq!(handler.max_buffer_entries, 100);
        assert_eq!(handler.shutdown_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
