//! Circuit breaker guarding the discovery call
//!
//! State checks and transitions happen under a short mutex; the wrapped
//! operation runs outside it, so concurrent callers only contend on the
//! bookkeeping, never on each other's I/O.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected without being attempted
    Open,
    /// One trial call is allowed through
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Circuit breaker configuration
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`]
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and the operation was not attempted
    #[error("circuit breaker open, retry after {retry_after:?}")]
    Open { retry_after: Duration },

    /// The operation ran and failed
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

/// Point-in-time view of the breaker
#[derive(Clone, Debug, PartialEq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker for preventing cascading failures
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Completes the bookkeeping of one admitted call. A trial that is dropped
/// before finishing counts as a failed trial so the slot is never leaked.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    finished: bool,
}

impl CallGuard<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        if success {
            self.breaker.on_success(self.trial);
        } else {
            self.breaker.on_failure(self.trial);
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished && self.trial {
            debug!("Circuit breaker: trial call dropped before completing");
            self.breaker.on_failure(true);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            since_last_failure: inner.last_failure_at.map(|at| at.elapsed()),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Any error from the operation counts as a failure; the breaker does not
    /// look at the error itself.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = self.admit().map_err(|retry_after| BreakerError::Open { retry_after })?;
        let guard = CallGuard {
            breaker: self,
            trial,
            finished: false,
        };

        let result = operation().await;
        guard.finish(result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    /// Decide whether a call may proceed. `Ok(true)` admits the half-open
    /// trial, `Err` carries the time left until the next trial.
    fn admit(&self) -> Result<bool, Duration> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed < self.config.reset_timeout {
                    return Err(self.config.reset_timeout - elapsed);
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.consecutive_failures = 0;
                inner.trial_in_flight = true;
                Ok(true)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(Duration::ZERO);
                }
                inner.trial_in_flight = true;
                Ok(true)
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.consecutive_failures = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Stragglers admitted before the circuit opened
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.last_failure_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => warn!(
                from = from.as_str(),
                consecutive_failures = inner.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened"
            ),
            _ => info!(from = from.as_str(), to = to.as_str(), "Circuit breaker state changed"),
        }
    }
}
