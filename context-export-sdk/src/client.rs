//! Resilient HTTP request executor
//!
//! Every request goes through the same pipeline:
//!
//! 1. GET requests are answered from the [`RequestCache`] when possible,
//!    without touching the network or the rate limiter.
//! 2. The [`RateLimiter`] admits the request, sleeping as often as needed.
//! 3. Up to `max_retries + 1` attempts run through the [`CircuitBreaker`],
//!    with exponential backoff between them.
//!
//! An open circuit and a status outside the retryable set end the request at
//! once. Otherwise the last attempt's error comes back wrapped in
//! [`SdkError::RetriesExhausted`].

use std::time::Duration;

use rand::Rng;
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use context_export_core::RetryConfig;

use crate::cache::RequestCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitSnapshot};
use crate::config::{AuthConfig, ClientConfig};
use crate::error::{SdkError, SdkResult};
use crate::rate_limiter::RateLimiter;

/// Query parameters, in request order
pub type QueryParams = [(String, String)];

/// A successful response, possibly served from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub from_cache: bool,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> SdkResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn text(&self) -> &str {
        &self.body
    }
}

/// Snapshot of a client's resilience state
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub name: String,
    pub available_tokens: f64,
    pub max_tokens: f64,
    pub circuit: CircuitSnapshot,
    /// `None` when caching is disabled
    pub cache_entries: Option<usize>,
    pub cache_max_size: Option<usize>,
}

/// HTTP client with rate limiting, circuit breaking, caching and retries.
///
/// Safe to share between tasks; wrap it in an `Arc`.
pub struct ResilientClient {
    name: String,
    http: Client,
    config: ClientConfig,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    cache: Option<RequestCache>,
}

impl ResilientClient {
    pub fn new(name: impl Into<String>, config: ClientConfig) -> SdkResult<Self> {
        config.validate()?;
        let name = name.into();

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .connect_timeout(config.timeout.connect_timeout)
            .timeout(config.timeout.read_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()?;

        let cache = config
            .cache
            .enabled
            .then(|| RequestCache::open(&config.cache));

        info!(
            client = %name,
            base_url = %config.base_url,
            max_retries = config.retry.max_retries,
            requests_per_second = config.rate_limit.requests_per_second,
            cache_enabled = cache.is_some(),
            "Initialized resilient client"
        );

        Ok(Self {
            rate_limiter: RateLimiter::new(&config.rate_limit),
            circuit_breaker: CircuitBreaker::new(name.clone(), config.circuit_breaker.clone()),
            name,
            http,
            config,
            cache,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    pub async fn get(&self, path: &str) -> SdkResult<ApiResponse> {
        self.request(Method::GET, path, &[], None, true).await
    }

    pub async fn get_with_params(&self, path: &str, params: &QueryParams) -> SdkResult<ApiResponse> {
        self.request(Method::GET, path, params, None, true).await
    }

    /// GET and deserialize the body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> SdkResult<T> {
        self.get_with_params(path, params).await?.json()
    }

    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> SdkResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, &[], Some(&body), false).await
    }

    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> SdkResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, &[], Some(&body), false).await
    }

    pub async fn delete(&self, path: &str) -> SdkResult<ApiResponse> {
        self.request(Method::DELETE, path, &[], None, false).await
    }

    /// Execute a request through cache, rate limiter, breaker and retries
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &QueryParams,
        body: Option<&Value>,
        use_cache: bool,
    ) -> SdkResult<ApiResponse> {
        let url = self.url(path);
        let cache = self
            .cache
            .as_ref()
            .filter(|_| use_cache && method == Method::GET);

        if let Some(cache) = cache {
            if let Some(payload) = cache.get(method.as_str(), &url, params) {
                return Ok(ApiResponse {
                    status: 200,
                    body: payload.to_string(),
                    from_cache: true,
                });
            }
        }

        self.wait_for_admission().await;

        let retry = &self.config.retry;
        let mut attempt: u32 = 0;
        loop {
            debug!(client = %self.name, %method, %url, attempt, "Sending request");

            let result = self
                .circuit_breaker
                .call(|| self.send_once(&method, &url, params, body))
                .await;

            let error = match result {
                Ok(response) => {
                    if let Some(cache) = cache {
                        // Only JSON bodies are cached
                        if let Ok(payload) = serde_json::from_str::<Value>(&response.body) {
                            cache.set(method.as_str(), &url, &payload, params);
                        }
                    }
                    return Ok(response);
                }
                Err(CircuitBreakerError::Open { name }) => {
                    warn!(client = %self.name, %url, "Circuit open, request rejected");
                    return Err(SdkError::CircuitOpen { name });
                }
                Err(CircuitBreakerError::ExecutionFailed(error)) => error,
            };

            if let SdkError::HttpStatus { status, message } = &error {
                if !retry.is_retryable_status(*status) {
                    warn!(client = %self.name, %url, status, "Non-retryable response");
                    return Err(SdkError::NonRetryable {
                        status: *status,
                        message: message.clone(),
                    });
                }
            }

            if attempt >= retry.max_retries {
                warn!(
                    client = %self.name,
                    %url,
                    attempts = attempt + 1,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(SdkError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(error),
                });
            }

            let delay = backoff_delay(retry, attempt);
            warn!(
                client = %self.name,
                %url,
                attempt = attempt + 1,
                max_retries = retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            name: self.name.clone(),
            available_tokens: self.rate_limiter.available_tokens(),
            max_tokens: self.rate_limiter.capacity(),
            circuit: self.circuit_breaker.snapshot(),
            cache_entries: self.cache.as_ref().map(RequestCache::len),
            cache_max_size: self.cache.as_ref().map(RequestCache::max_size),
        }
    }

    pub fn cache(&self) -> Option<&RequestCache> {
        self.cache.as_ref()
    }

    /// Sleep until the rate limiter admits one request
    async fn wait_for_admission(&self) {
        loop {
            let wait = self.rate_limiter.acquire(1.0);
            if wait.is_zero() {
                return;
            }
            debug!(client = %self.name, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// One network attempt. Any non-2xx status is an error.
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> SdkResult<ApiResponse> {
        let mut request = self.add_auth(self.http.request(method.clone(), url));
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body: text,
                from_cache: false,
            })
        } else {
            Err(SdkError::from_response(status.as_u16(), &text))
        }
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::BearerToken(token) => {
                request.header(header::AUTHORIZATION, format!("Bearer {}", token))
            }
            AuthConfig::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }
}

/// Delay before retry number `attempt + 1`.
///
/// `min(initial_delay * exponential_base^attempt, max_delay)`, perturbed by up
/// to ±25% when jitter is enabled and never negative.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let max = retry.max_delay.as_secs_f64();
    let mut delay = (retry.initial_delay.as_secs_f64() * retry.exponential_base.powi(exponent)).min(max);

    if retry.jitter {
        let offset = rand::thread_rng().gen_range(-1.0f64..=1.0) * 0.25 * delay;
        delay += offset;
    }

    Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(retry.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_export_core::CacheConfig;

    fn client() -> ResilientClient {
        let config = ClientConfig::new("https://wiki.example.com/").with_cache(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        ResilientClient::new("wiki", config).unwrap()
    }

    fn retry(jitter: bool) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_url_building() {
        let client = client();

        assert_eq!(
            client.url("/rest/api/content"),
            "https://wiki.example.com/rest/api/content"
        );
        assert_eq!(
            client.url("rest/api/content"),
            "https://wiki.example.com/rest/api/content"
        );
        assert_eq!(client.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = retry(false);

        assert_eq!(backoff_delay(&retry, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&retry, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&retry, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(&retry, 4), Duration::from_secs(10));
        assert_eq!(backoff_delay(&retry, 500), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_jitter_stays_within_quarter() {
        let retry = retry(true);

        for _ in 0..200 {
            let delay = backoff_delay(&retry, 2).as_secs_f64();
            assert!((3.0..=5.0).contains(&delay), "delay was {delay}");
        }
    }

    #[test]
    fn test_stats_without_cache() {
        let stats = client().stats();

        assert_eq!(stats.name, "wiki");
        assert_eq!(stats.max_tokens, 20.0);
        assert_eq!(stats.cache_entries, None);
        assert_eq!(stats.circuit.failure_count, 0);
    }

    #[test]
    fn test_empty_bucket_is_rejected_at_construction() {
        let mut config = ClientConfig::new("https://wiki.example.com/");
        config.rate_limit.burst_size = 0;

        assert!(matches!(
            ResilientClient::new("wiki", config),
            Err(SdkError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse {
            status: 200,
            body: r#"{"size": 3}"#.to_string(),
            from_cache: false,
        };
        let value: Value = response.json().unwrap();

        assert_eq!(value["size"], 3);
        assert_eq!(response.text(), r#"{"size": 3}"#);
    }
}
