//! Retry policies consulted by [`super::Retrier`].

use std::time::Duration;

/// Outcome of consulting a policy after a failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Try again after waiting for the given duration.
    Retry(Duration),
    /// Give up and surface the last error.
    Stop,
}

impl RetryDecision {
    /// Returns `true` when the policy asked for another attempt.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    /// Returns the wait requested before the next attempt, if any.
    #[must_use]
    pub const fn wait(&self) -> Option<Duration> {
        match self {
            Self::Retry(wait) => Some(*wait),
            Self::Stop => None,
        }
    }
}

/// Errors that can tell whether they represent a rate-limit rejection.
pub trait RateLimited {
    /// Returns `true` when the error was caused by throttling.
    fn is_rate_limited(&self) -> bool;
}

/// Decides whether and when a failed attempt is retried.
pub trait RetryPolicy<E> {
    /// Elapsed-time budget for the whole retry loop; `None` means unbounded.
    fn ceiling(&self) -> Option<Duration>;

    /// Maps the number of attempts made so far and the last error to a
    /// decision. `attempts` is `1` after the first failure.
    fn decide(&self, attempts: u32, error: &E) -> RetryDecision;
}

/// Retries any error up to a fixed number of attempts at a fixed interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FixedInterval {
    max_attempts: u32,
    interval: Duration,
    ceiling: Option<Duration>,
}

impl FixedInterval {
    /// Creates a policy allowing `max_attempts` attempts in total.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ceiling: None,
        }
    }

    /// Bounds the loop by an elapsed-time budget as well.
    #[must_use]
    pub const fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Total number of attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl<E> RetryPolicy<E> for FixedInterval {
    fn ceiling(&self) -> Option<Duration> {
        self.ceiling
    }

    fn decide(&self, attempts: u32, _error: &E) -> RetryDecision {
        if attempts < self.max_attempts {
            RetryDecision::Retry(self.interval)
        } else {
            RetryDecision::Stop
        }
    }
}

/// Retries only rate-limit errors, waiting a fixed period between attempts.
///
/// Any other error stops the loop immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThrottleBackoff {
    max_attempts: u32,
    wait: Duration,
    ceiling: Option<Duration>,
}

impl ThrottleBackoff {
    /// Creates a policy that retries throttled attempts while fewer than
    /// `max_attempts` have been made.
    #[must_use]
    pub const fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            wait,
            ceiling: None,
        }
    }

    /// Bounds the loop by an elapsed-time budget as well.
    #[must_use]
    pub const fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }
}

impl<E: RateLimited> RetryPolicy<E> for ThrottleBackoff {
    fn ceiling(&self) -> Option<Duration> {
        self.ceiling
    }

    fn decide(&self, attempts: u32, error: &E) -> RetryDecision {
        if error.is_rate_limited() && attempts < self.max_attempts {
            RetryDecision::Retry(self.wait)
        } else {
            RetryDecision::Stop
        }
    }
}
