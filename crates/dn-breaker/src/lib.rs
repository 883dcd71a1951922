//! Circuit breaker guarding external-backend calls.
//!
//! Tracks outcomes in a bounded ring buffer and opens when the error rate
//! over the window crosses a configured threshold. A timed-out call counts
//! as a failure. After a cooldown the breaker half-opens to admit a single
//! probe call, closing again on success or reopening on failure.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for a single breaker instance.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Per-call timeout; a timed-out call counts as a failure.
    pub call_timeout: Duration,
    /// Error rate (0.0-1.0) over the window that trips the breaker.
    pub error_rate_threshold: f64,
    /// Cooldown before a half-open probe is allowed.
    pub reset_timeout: Duration,
    /// Number of recent outcomes the rolling window retains.
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            error_rate_threshold: 0.6,
            reset_timeout: Duration::from_secs(30),
            window_size: 10,
        }
    }
}

/// Error returned by `fire`, distinguishing a short-circuited call from one
/// that actually reached the adapter and failed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("breaker_open")]
    Open,
    #[error("call timed out")]
    Timeout,
    #[error(transparent)]
    Inner(E),
}

/// Wraps a fallible asynchronous operation with a rolling-window error-rate
/// breaker. One instance per external integration (SMTP, push gateway),
/// held by the channel adapter.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    window: Mutex<VecDeque<bool>>,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            window: Mutex::new(VecDeque::new()),
            opened_at: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    fn allow_request(&self) -> bool {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let should_probe = self
                    .opened_at
                    .read()
                    .map(|opened| opened.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(false);
                if should_probe {
                    *self.state.write() = CircuitState::HalfOpen;
                    debug!(breaker = %self.name, "circuit breaker half-open, probing");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn record(&self, success: bool) {
        let error_rate = {
            let mut window = self.window.lock();
            window.push_back(success);
            if window.len() > self.config.window_size {
                window.pop_front();
            }
            let total = window.len() as f64;
            let failures = window.iter().filter(|ok| !**ok).count() as f64;
            failures / total
        };

        let state = *self.state.read();
        match state {
            CircuitState::HalfOpen => {
                if success {
                    *self.state.write() = CircuitState::Closed;
                    self.window.lock().clear();
                    info!(breaker = %self.name, "circuit breaker closed after probe success");
                } else {
                    *self.state.write() = CircuitState::Open;
                    *self.opened_at.write() = Some(Instant::now());
                    warn!(breaker = %self.name, "circuit breaker re-opened after probe failure");
                }
            }
            CircuitState::Closed => {
                if error_rate >= self.config.error_rate_threshold {
                    *self.state.write() = CircuitState::Open;
                    *self.opened_at.write() = Some(Instant::now());
                    warn!(breaker = %self.name, error_rate, "circuit breaker opened: error rate threshold crossed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Invoke `f` through the breaker. Fails immediately with
    /// `BreakerError::Open` without invoking `f` while open.
    pub async fn fire<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(BreakerError::Open);
        }

        match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(Ok(value)) => {
                self.record(true);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record(false);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                self.record(false);
                Err(BreakerError::Timeout)
            }
        }
    }
}
