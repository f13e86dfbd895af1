//! Per-activity-type/resource circuit breaker, consulted as an optional
//! guard before an operation or its compensation is attempted (SPEC_FULL
//! §4.9 "Circuit breaker"). Grounded on the teacher's
//! `CircuitBreakerConfig`/`CircuitState` state machine
//! (`durable/src/reliability/circuit_breaker.rs`) and the permit-based
//! `allow()`/`success()`/`failure()` call shape of its
//! `DistributedCircuitBreaker` (`reliability/distributed_circuit_breaker.rs`),
//! adapted to a single-process in-memory guard since cross-node consensus is
//! out of scope.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open")]
    Open,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// A single-process circuit breaker keyed implicitly by whatever resource
/// the caller associates with this instance (one instance per activity
/// type/resource, per the guidance this is grounded on).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Returned by [`CircuitBreaker::allow`]; the caller must report the
/// outcome of the guarded call back through it.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
}

impl<'a> Permit<'a> {
    pub fn success(self) {
        self.breaker.record_success();
    }

    pub fn failure(self) {
        self.breaker.record_failure();
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Checks whether a call should proceed, transitioning `Open ->
    /// HalfOpen` if the reset timeout has elapsed.
    pub fn allow(&self) -> Result<Permit<'_>, CircuitBreakerError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(Permit { breaker: self }),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    Ok(Permit { breaker: self })
                } else {
                    Err(CircuitBreakerError::Open)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_failure_threshold_and_rejects_calls() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(2));
        breaker.allow().unwrap().failure();
        breaker.allow().unwrap().failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.allow(), Err(CircuitBreakerError::Open)));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_success_threshold(2)
                .with_reset_timeout(Duration::from_millis(0)),
        );
        breaker.allow().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.allow().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.allow().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::from_millis(0)),
        );
        breaker.allow().unwrap().failure();
        breaker.allow().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
