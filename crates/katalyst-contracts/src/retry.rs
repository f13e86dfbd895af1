//! Retry policy shared by the Transaction Manager (spec §4.5) and the
//! workflow engine's activity executor (spec §4.9).
//!
//! Adapted from a single-strategy (exponential-only) retry policy into one
//! supporting the three backoff kinds spec §4.5 calls for, plus explicit
//! retryable/non-retryable classification that takes the *exception type*
//! over the message, per §4.5's "exception type takes precedence over
//! message" rule.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff shape between retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Exponential,
    Linear,
    Immediate,
}

/// A transient-error classifier consulted when neither the explicit
/// retryable nor non-retryable lists name a kind (spec §4.5 built-in
/// transient classifier).
const BUILTIN_TRANSIENT_KINDS: &[&str] = &[
    "timeout",
    "connection",
    "unavailable",
    "io_error",
    "deadlock",
];

/// Configurable retry/backoff policy.
///
/// # Example
///
/// ```
/// use katalyst_contracts::retry::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Backoff::Exponential)
///     .with_max_attempts(5)
///     .with_initial_delay(Duration::from_millis(100))
///     .with_max_delay(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    pub backoff: Backoff,

    /// 0.0-1.0 fraction of the base delay applied as uniform jitter.
    pub jitter_factor: f64,

    /// Error kinds that must never be retried, regardless of the
    /// classifier. Takes precedence over `retryable_kinds`.
    #[serde(default)]
    pub non_retryable_kinds: Vec<String>,

    /// Error kinds that should always be retried (beyond the built-in
    /// transient classifier).
    #[serde(default)]
    pub retryable_kinds: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Backoff::Exponential)
    }
}

impl RetryPolicy {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff,
            jitter_factor: 0.1,
            non_retryable_kinds: Vec::new(),
            retryable_kinds: Vec::new(),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Immediate,
            jitter_factor: 0.0,
            non_retryable_kinds: Vec::new(),
            retryable_kinds: Vec::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_non_retryable(mut self, kind: impl Into<String>) -> Self {
        self.non_retryable_kinds.push(kind.into());
        self
    }

    pub fn with_retryable(mut self, kind: impl Into<String>) -> Self {
        self.retryable_kinds.push(kind.into());
        self
    }

    pub fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Classify an error kind as retryable. Explicit non-retryable list
    /// wins, then the explicit retryable list, then the built-in transient
    /// classifier.
    pub fn should_retry(&self, error_kind: &str) -> bool {
        let kind = error_kind.to_ascii_lowercase();
        if self
            .non_retryable_kinds
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&kind))
        {
            return false;
        }
        if self
            .retryable_kinds
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&kind))
        {
            return true;
        }
        BUILTIN_TRANSIENT_KINDS
            .iter()
            .any(|k| kind.contains(k))
    }

    /// Delay before the given retry attempt (1-based: attempt 1 is the
    /// first retry after the initial try).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_secs = self.initial_delay.as_secs_f64();
        let raw = match self.backoff {
            Backoff::Immediate => 0.0,
            Backoff::Linear => base_secs * attempt as f64,
            Backoff::Exponential => base_secs * 2f64.powi(attempt as i32 - 1),
        };
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter_factor > 0.0 && capped > 0.0 {
            let range = capped * self.jitter_factor;
            let offset = rand::thread_rng().gen_range(-range..=range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delays_double_and_cap() {
        let policy = RetryPolicy::new(Backoff::Exponential)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn linear_delays_scale_by_attempt() {
        let policy = RetryPolicy::new(Backoff::Linear)
            .with_initial_delay(Duration::from_secs(2))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(6));
    }

    #[test]
    fn immediate_backoff_never_waits() {
        let policy = RetryPolicy::new(Backoff::Immediate);
        assert_eq!(policy.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn non_retryable_takes_precedence_over_retryable() {
        let policy = RetryPolicy::default()
            .with_non_retryable("validation")
            .with_retryable("validation");

        assert!(!policy.should_retry("validation"));
    }

    #[test]
    fn builtin_classifier_recognizes_transient_kinds() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry("connection_reset"));
        assert!(policy.should_retry("request_timeout"));
        assert!(!policy.should_retry("permanent_constraint_violation"));
    }

    #[test]
    fn has_attempts_remaining_respects_max() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.has_attempts_remaining(0));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn serde_roundtrip() {
        let policy = RetryPolicy::new(Backoff::Linear).with_max_attempts(7);
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }
}
