//! Client configuration
//!
//! A [`ClientConfig`] bundles the endpoint, credentials and the resilience
//! settings one [`ResilientClient`](crate::ResilientClient) is built from.

use std::fmt;

use context_export_core::{
    CacheConfig, CircuitBreakerConfig, ExporterConfig, RateLimitConfig, RetryConfig, TimeoutConfig,
};

use crate::error::{SdkError, SdkResult};

/// Configuration for one resilient client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto
    pub base_url: String,
    pub auth: AuthConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Ignored unless `cache.enabled`
    pub cache: CacheConfig,
    pub timeout: TimeoutConfig,
    pub user_agent: String,
}

impl ClientConfig {
    /// Defaults for every resilience setting
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::None,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            timeout: TimeoutConfig::default(),
            user_agent: format!("context-export/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Take the resilience settings from a resolved exporter configuration
    pub fn from_exporter(base_url: impl Into<String>, config: &ExporterConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            rate_limit: config.rate_limit.clone(),
            circuit_breaker: config.circuit_breaker.clone(),
            cache: config.cache.clone(),
            timeout: config.timeout.clone(),
            ..Self::new(base_url)
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> SdkResult<()> {
        if self.base_url.is_empty() {
            return Err(SdkError::ConfigurationError(
                "Base URL cannot be empty".to_string(),
            ));
        }

        url::Url::parse(&self.base_url)?;

        if self.timeout.read_timeout.is_zero() {
            return Err(SdkError::ConfigurationError(
                "Read timeout cannot be zero".to_string(),
            ));
        }
        if !(self.rate_limit.requests_per_second > 0.0) {
            return Err(SdkError::ConfigurationError(
                "requests_per_second must be positive".to_string(),
            ));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(SdkError::ConfigurationError(
                "burst_size must be at least 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(SdkError::ConfigurationError(
                "cache max_size must be at least 1 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Authentication configuration
#[derive(Clone, Default)]
pub enum AuthConfig {
    #[default]
    None,

    /// Bearer token, e.g. a personal access token
    BearerToken(String),

    /// Username and API token for basic auth
    Basic { username: String, password: String },
}

impl AuthConfig {
    pub fn is_configured(&self) -> bool {
        !matches!(self, AuthConfig::None)
    }
}

// Credentials never appear in logs
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => write!(f, "None"),
            AuthConfig::BearerToken(_) => write!(f, "BearerToken(***)"),
            AuthConfig::Basic { username, .. } => {
                write!(f, "Basic {{ username: {username:?}, password: *** }}")
            }
        }
    }
}
