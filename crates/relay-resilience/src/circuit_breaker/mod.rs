//! Circuit breaker implementation.
//!
//! Admission and outcome recording are split: a queue asks the breaker
//! whether to admit a submission, and reports the outcome later when the job
//! finishes on a worker.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed - submissions are admitted.
    Closed,
    /// Circuit is open - submissions are rejected.
    Open,
    /// Circuit is half-open - a single trial submission is admitted.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a trial.
    /// `None` keeps the circuit open until [`CircuitBreaker::reset`].
    pub reset_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Returns the name of the circuit breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state of the circuit breaker.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the current consecutive failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Decides whether a new submission may be admitted.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open and
    /// admits exactly one trial; further calls are rejected until that trial's
    /// outcome is recorded.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = match (self.config.reset_timeout, inner.opened_at) {
                    (Some(timeout), Some(opened_at)) => opened_at.elapsed() >= timeout,
                    _ => false,
                };
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(circuit = %self.name, "Circuit breaker half-open, admitting trial");
                }
                elapsed
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful outcome: the count resets and the circuit closes.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;

        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;

        if previous != CircuitState::Closed {
            info!(circuit = %self.name, "Circuit breaker closed after success");
        }
    }

    /// Records a failed outcome.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failures = inner.consecutive_failures;

        match inner.state {
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        circuit = %self.name,
                        failures,
                        "Circuit breaker opened after {} consecutive failures",
                        failures
                    );
                } else {
                    debug!(circuit = %self.name, failures, "Failure recorded");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!(circuit = %self.name, "Circuit breaker reopened after failed trial");
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    /// Manually resets the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        info!(circuit = %self.name, "Circuit breaker manually reset");
    }
}
