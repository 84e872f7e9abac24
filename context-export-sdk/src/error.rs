//! SDK error types
//!
//! The executor surfaces three outcomes a caller is expected to branch on:
//! [`SdkError::CircuitOpen`], [`SdkError::NonRetryable`] and
//! [`SdkError::RetriesExhausted`]. The remaining variants describe a single
//! failed attempt and normally reach the caller wrapped in `RetriesExhausted`.

use serde::Deserialize;
use thiserror::Error;

/// Longest error body excerpt kept in an error message
const MAX_MESSAGE_LEN: usize = 200;

/// The main error type for the SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// The circuit breaker rejected the call without invoking it
    #[error("Circuit breaker is open for {name}")]
    CircuitOpen { name: String },

    /// The server answered with a status outside the retryable set
    #[error("Non-retryable HTTP error: {status} - {message}")]
    NonRetryable { status: u16, message: String },

    /// Every attempt failed; carries the last attempt's error
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SdkError> },

    /// A single attempt got a non-success status
    #[error("HTTP error: {status} - {message}")]
    HttpStatus { status: u16, message: String },

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type alias for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;

/// Error envelopes returned by the wiki and tracker APIs
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
}

impl SdkError {
    /// Build an attempt error from a non-success response
    pub fn from_response(status: u16, body: &str) -> Self {
        SdkError::HttpStatus {
            status,
            message: extract_message(body),
        }
    }

    /// Check if a single-attempt error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdkError::NetworkError(_) | SdkError::HttpStatus { .. })
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SdkError::NonRetryable { status, .. } | SdkError::HttpStatus { status, .. } => {
                Some(*status)
            }
            SdkError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            SdkError::RetriesExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }

    /// Whether the failure was imposed by the circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, SdkError::CircuitOpen { .. })
    }
}

fn extract_message(body: &str) -> String {
    let message = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(ApiErrorResponse {
            message: Some(message),
            ..
        }) => message,
        Ok(response) if !response.error_messages.is_empty() => response.error_messages.join("; "),
        _ => body.trim().to_string(),
    };

    if message.chars().count() > MAX_MESSAGE_LEN {
        message.chars().take(MAX_MESSAGE_LEN).collect()
    } else {
        message
    }
}
