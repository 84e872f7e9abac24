//! Resilient access layer for the wiki and tracker export APIs
//!
//! Every outbound request passes through the same stack of safeguards:
//!
//! - **Rate limiting**: a token bucket paces requests ([`RateLimiter`])
//! - **Circuit breaking**: a failing service is left alone until it recovers
//!   ([`CircuitBreaker`])
//! - **Caching**: GET responses are kept on disk for a configurable TTL
//!   ([`RequestCache`])
//! - **Retries**: transient failures are retried with exponential backoff and
//!   jitter ([`ResilientClient`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use context_export_core::{ExporterConfig, Profile};
//! use context_export_sdk::{AuthConfig, ClientConfig, ResilientClient, WikiClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = ExporterConfig::for_profile(Profile::Balanced);
//!     let config = ClientConfig::from_exporter("https://wiki.example.com", &exporter)
//!         .with_auth(AuthConfig::Basic {
//!             username: "me@example.com".to_string(),
//!             password: "api-token".to_string(),
//!         });
//!
//!     let wiki = WikiClient::new(Arc::new(ResilientClient::new("wiki", config)?));
//!     let page = wiki.search_by_label("release-notes", 0, 25).await?;
//!     println!("Found {} pages", page.size);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! ```rust,no_run
//! use context_export_sdk::{ResilientClient, SdkError};
//!
//! async fn fetch(client: &ResilientClient) {
//!     match client.get("/rest/api/content/42").await {
//!         Ok(response) => println!("{} bytes", response.body.len()),
//!         Err(SdkError::CircuitOpen { name }) => eprintln!("{name} is unavailable"),
//!         Err(SdkError::NonRetryable { status, .. }) => eprintln!("rejected with {status}"),
//!         Err(SdkError::RetriesExhausted { attempts, last }) => {
//!             eprintln!("gave up after {attempts} attempts: {last}")
//!         }
//!         Err(e) => eprintln!("Other error: {e}"),
//!     }
//! }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod rate_limiter;
pub mod resources;

pub use cache::RequestCache;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitSnapshot, CircuitState};
pub use client::{backoff_delay, ApiResponse, ClientStats, QueryParams, ResilientClient};
pub use config::{AuthConfig, ClientConfig};
pub use error::{SdkError, SdkResult};
pub use rate_limiter::RateLimiter;
pub use resources::tracker::{TrackerIssue, TrackerSearchPage};
pub use resources::wiki::{WikiPage, WikiSearchPage};
pub use resources::{TrackerClient, WikiClient};
