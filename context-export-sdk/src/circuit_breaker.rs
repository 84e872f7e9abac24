//! Circuit breaker for isolating a failing upstream service.
//!
//! # States
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: the failure threshold was reached, calls are rejected without
//!   being invoked until the recovery timeout has elapsed since the last failure
//! - **HalfOpen**: a single probe call is let through; success closes the
//!   circuit, failure opens it again
//!
//! Bookkeeping is guarded by a `std::sync::Mutex` that is released before the
//! protected future is polled, so concurrent callers only serialize on the
//! state transition itself.
//!
//! # Example
//!
//! ```no_run
//! use context_export_core::CircuitBreakerConfig;
//! use context_export_sdk::circuit_breaker::CircuitBreaker;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new("wiki", CircuitBreakerConfig::default());
//!
//! match breaker.call(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(value) => println!("Success: {value}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use context_export_core::CircuitBreakerConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the call was not attempted
    #[error("Circuit breaker is open for {name}")]
    Open { name: String },

    /// The protected call failed; the error is passed through unchanged
    #[error("Execution failed: {0}")]
    ExecutionFailed(E),
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// Start of the in-flight half-open probe
    probe_started: Option<Instant>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            "Creating circuit breaker"
        );

        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_started: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failure_count,
        }
    }

    /// Call a function with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call()?;

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitBreakerError::ExecutionFailed(e))
            }
        }
    }

    /// Admit or reject a call, moving Open to HalfOpen once recovered
    fn before_call<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut state = self.lock();
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let recovered = state
                    .last_failure_time
                    .map_or(true, |t| now.duration_since(t) >= self.config.recovery_timeout);

                if recovered {
                    info!(breaker = %self.name, "Circuit breaker half-open, probing");
                    state.state = CircuitState::HalfOpen;
                    state.probe_started = Some(now);
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                // A probe that never reported back (its future was dropped)
                // stops blocking once a full recovery window has passed.
                let probe_stale = state
                    .probe_started
                    .map_or(true, |t| now.duration_since(t) >= self.config.recovery_timeout);

                if probe_stale {
                    state.probe_started = Some(now);
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();
        if state.state != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker closed");
        }
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.probe_started = None;
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Probe failed, circuit breaker re-opened");
                state.state = CircuitState::Open;
                state.probe_started = None;
            }
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = %self.name,
                    failure_count = state.failure_count,
                    "Circuit breaker opened"
                );
                state.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    /// Force the breaker back to closed
    pub fn reset(&self) {
        let mut state = self.lock();
        info!(breaker = %self.name, "Manually resetting circuit breaker");
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure_time = None;
        state.probe_started = None;
    }

    fn open_error<E>(&self) -> CircuitBreakerError<E> {
        debug!(breaker = %self.name, "Circuit breaker rejected call");
        CircuitBreakerError::Open {
            name: self.name.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
