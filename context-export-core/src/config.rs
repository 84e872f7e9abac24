//! Typed exporter configuration.
//!
//! Every concern gets its own struct with explicit defaults. A [`Profile`] is a
//! named set of overrides on top of those defaults. [`ExporterConfig::load`]
//! then layers an optional config file and `EXPORTER_*` environment variables
//! over the profile, using the `config` crate.
//!
//! ```no_run
//! use context_export_core::{ExporterConfig, Profile};
//!
//! let config = ExporterConfig::load(Profile::Conservative, None)?;
//! assert_eq!(config.retry.max_retries, 5);
//! # Ok::<(), context_export_core::CoreError>(())
//! ```

use config::{Config as ConfigLoader, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Environment variable naming an optional config file.
pub const CONFIG_FILE_ENV: &str = "EXPORTER_CONFIG_FILE";

/// Prefix for per-field environment overrides, e.g. `EXPORTER_RETRY__MAX_RETRIES`.
pub const ENV_PREFIX: &str = "EXPORTER";

// ============================================================================
// Per-concern configuration
// ============================================================================

/// Retry and backoff behaviour of the request executor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Perturb each delay by up to ±25%
    pub jitter: bool,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Token bucket admission control
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst_size: u32,
    /// Lower bound on any non-zero wait
    #[serde(with = "duration_secs")]
    pub min_request_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_size: 20,
            min_request_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time after the last failure before a probe call is allowed
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// On-disk response cache for idempotent GET requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    pub max_size: usize,
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_size: 1000,
            cache_dir: PathBuf::from(".cache/context_export"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Page sizes used while walking search results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub wiki_batch_size: u32,
    pub tracker_batch_size: u32,
    pub max_concurrent_requests: u32,
    /// Levels of child pages followed below each labeled wiki page; 0 disables
    pub wiki_child_depth: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            wiki_batch_size: 100,
            tracker_batch_size: 50,
            max_concurrent_requests: 5,
            wiki_child_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub checkpoint_dir: PathBuf,
    /// Durable write every N progress updates unless forced
    pub checkpoint_interval: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checkpoint_dir: PathBuf::from(".checkpoints"),
            checkpoint_interval: 10,
        }
    }
}

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production (machine-readable)
    #[default]
    Json,
    /// Multi-line human readable output
    #[serde(alias = "text")]
    Pretty,
    /// Single-line human readable output
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// JSON log file written alongside console output
    pub log_file: Option<PathBuf>,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            log_file: Some(PathBuf::from("context_export.log")),
            console_output: true,
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Predefined tuning profiles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Minimal delays, may hit rate limits
    Fast,
    #[default]
    Balanced,
    /// Maximum reliability, slowest
    Conservative,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Fast, Profile::Balanced, Profile::Conservative];

    pub fn description(&self) -> &'static str {
        match self {
            Profile::Fast => "Fast export with minimal delays (may hit rate limits)",
            Profile::Balanced => "Balanced profile for most use cases",
            Profile::Conservative => "Conservative profile for maximum reliability",
        }
    }

    /// Apply this profile's overrides to `config`.
    fn apply(&self, config: &mut ExporterConfig) {
        match self {
            Profile::Fast => {
                config.retry.max_retries = 2;
                config.retry.initial_delay = Duration::from_millis(500);
                config.rate_limit.requests_per_second = 20.0;
                config.rate_limit.min_request_interval = Duration::from_millis(50);
                config.timeout.connect_timeout = Duration::from_secs(5);
                config.timeout.read_timeout = Duration::from_secs(20);
                config.batch.wiki_batch_size = 200;
                config.batch.tracker_batch_size = 100;
            }
            Profile::Balanced => {}
            Profile::Conservative => {
                config.retry.max_retries = 5;
                config.retry.initial_delay = Duration::from_secs(2);
                config.retry.max_delay = Duration::from_secs(120);
                config.rate_limit.requests_per_second = 5.0;
                config.rate_limit.min_request_interval = Duration::from_millis(200);
                config.timeout.connect_timeout = Duration::from_secs(15);
                config.timeout.read_timeout = Duration::from_secs(60);
                config.batch.wiki_batch_size = 50;
                config.batch.tracker_batch_size = 25;
                config.batch.max_concurrent_requests = 2;
            }
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Fast => write!(f, "fast"),
            Profile::Balanced => write!(f, "balanced"),
            Profile::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for Profile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Profile::Fast),
            "balanced" => Ok(Profile::Balanced),
            "conservative" => Ok(Profile::Conservative),
            other => Err(CoreError::UnknownProfile(other.to_string())),
        }
    }
}

// ============================================================================
// Aggregate configuration
// ============================================================================

/// Fully resolved exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ExporterConfig {
    pub profile: Profile,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub timeout: TimeoutConfig,
    pub batch: BatchConfig,
    pub checkpoint: CheckpointConfig,
    pub logging: LoggingConfig,
}

impl ExporterConfig {
    /// Defaults with the given profile's overrides applied.
    pub fn for_profile(profile: Profile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };
        profile.apply(&mut config);
        config
    }

    /// Resolve configuration: profile defaults, then the config file (the
    /// explicit path, else `EXPORTER_CONFIG_FILE`, else `exporter_config.*`
    /// in the working directory), then `EXPORTER_<SECTION>__<FIELD>`
    /// environment variables.
    pub fn load(profile: Profile, config_file: Option<&Path>) -> Result<Self> {
        let defaults = ConfigLoader::try_from(&Self::for_profile(profile))?;

        let mut builder = ConfigLoader::builder().add_source(defaults);

        builder = match config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from))
        {
            Some(path) => builder.add_source(File::from(path).required(false)),
            None => builder.add_source(File::with_name("exporter_config").required(false)),
        };

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("retry.retryable_status_codes"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rate_limit.requests_per_second > 0.0) {
            return Err(CoreError::Validation(
                "rate_limit.requests_per_second must be positive".to_string(),
            ));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(CoreError::Validation(
                "rate_limit.burst_size must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(CoreError::Validation(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.exponential_base < 1.0 {
            return Err(CoreError::Validation(
                "retry.exponential_base must be >= 1.0".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(CoreError::Validation(
                "cache.max_size must be at least 1 when caching is enabled".to_string(),
            ));
        }
        if self.checkpoint.checkpoint_interval == 0 {
            return Err(CoreError::Validation(
                "checkpoint.checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.batch.wiki_batch_size == 0 || self.batch.tracker_batch_size == 0 {
            return Err(CoreError::Validation(
                "batch sizes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the resolved configuration as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn profile_info(&self) -> ProfileInfo {
        ProfileInfo {
            profile: self.profile,
            requests_per_second: self.rate_limit.requests_per_second,
            max_retries: self.retry.max_retries,
            wiki_batch_size: self.batch.wiki_batch_size,
            tracker_batch_size: self.batch.tracker_batch_size,
            connect_timeout_secs: self.timeout.connect_timeout.as_secs_f64(),
            read_timeout_secs: self.timeout.read_timeout.as_secs_f64(),
            cache_enabled: self.cache.enabled,
            checkpoint_enabled: self.checkpoint.enabled,
        }
    }
}

/// Flat summary of the settings that matter when reading an export log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileInfo {
    pub profile: Profile,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub wiki_batch_size: u32,
    pub tracker_batch_size: u32,
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
    pub cache_enabled: bool,
    pub checkpoint_enabled: bool,
}

/// Serialize a `Duration` as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for key in [
            CONFIG_FILE_ENV,
            "EXPORTER_RETRY__MAX_RETRIES",
            "EXPORTER_RATE_LIMIT__REQUESTS_PER_SECOND",
            "EXPORTER_RETRY__RETRYABLE_STATUS_CODES",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.profile, Profile::Balanced);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retryable_status_codes, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.rate_limit.burst_size, 20);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.checkpoint.checkpoint_interval, 10);
        assert_eq!(config.batch.wiki_child_depth, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles_override_defaults() {
        let fast = ExporterConfig::for_profile(Profile::Fast);
        assert_eq!(fast.retry.max_retries, 2);
        assert_eq!(fast.rate_limit.requests_per_second, 20.0);
        assert_eq!(fast.batch.wiki_batch_size, 200);
        // Untouched sections keep their defaults
        assert_eq!(fast.circuit_breaker, CircuitBreakerConfig::default());

        let conservative = ExporterConfig::for_profile(Profile::Conservative);
        assert_eq!(conservative.retry.max_delay, Duration::from_secs(120));
        assert_eq!(conservative.batch.max_concurrent_requests, 2);

        assert_eq!(
            ExporterConfig::for_profile(Profile::Balanced),
            ExporterConfig::default()
        );
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("FAST".parse::<Profile>().unwrap(), Profile::Fast);
        assert_eq!(Profile::Conservative.to_string(), "conservative");
        assert!(matches!(
            "turbo".parse::<Profile>(),
            Err(CoreError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ExporterConfig::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config.checkpoint.checkpoint_interval = 0;
        assert!(config.validate().is_err());

        let mut config = ExporterConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let json = serde_json::to_value(RateLimitConfig::default()).unwrap();
        assert_eq!(json["min_request_interval"], 0.1);

        let parsed: RetryConfig =
            serde_json::from_value(serde_json::json!({ "initial_delay": 0.25 })).unwrap();
        assert_eq!(parsed.initial_delay, Duration::from_millis(250));
        assert_eq!(parsed.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_load_layers_file_over_profile() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exporter.json");
        std::fs::write(
            &path,
            r#"{ "retry": { "max_retries": 7 }, "cache": { "enabled": false } }"#,
        )
        .unwrap();

        let config = ExporterConfig::load(Profile::Fast, Some(&path)).unwrap();

        assert_eq!(config.retry.max_retries, 7);
        // Sibling fields keep the profile value
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert!(!config.cache.enabled);
        assert_eq!(config.profile, Profile::Fast);
    }

    #[test]
    #[serial]
    fn test_load_applies_env_overrides() {
        clear_env();
        std::env::set_var("EXPORTER_RETRY__MAX_RETRIES", "9");
        std::env::set_var("EXPORTER_RATE_LIMIT__REQUESTS_PER_SECOND", "2.5");
        std::env::set_var("EXPORTER_RETRY__RETRYABLE_STATUS_CODES", "429,503");

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        let result = ExporterConfig::load(Profile::Balanced, Some(&missing));
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.retry.max_retries, 9);
        assert_eq!(config.rate_limit.requests_per_second, 2.5);
        assert_eq!(config.retry.retryable_status_codes, vec![429, 503]);
    }

    #[test]
    fn test_save_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.json");
        let config = ExporterConfig::for_profile(Profile::Conservative);

        config.save_to_file(&path).unwrap();
        let restored: ExporterConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(restored, config);
    }
}
