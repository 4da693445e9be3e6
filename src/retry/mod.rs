//! Bounded retry and polling loops.
//!
//! [`Retrier`] repeatedly awaits an operation, consulting a [`RetryPolicy`]
//! after every failure. The policy bounds the loop by attempt count and the
//! retrier additionally enforces the policy's wall-clock ceiling, checked both
//! before and after each wait. Waits use `tokio::time`, so only the calling
//! task is suspended and tests can drive long timelines with a paused clock.
//!
//! [`Retrier::poll`] reuses the same budget for operations that can report
//! "not finished yet" through [`Progress::Running`] rather than failing.

mod policy;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

pub use policy::{FixedInterval, RateLimited, RetryDecision, RetryPolicy, ThrottleBackoff};

/// Returned when the retry budget runs out before the operation succeeds.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("retries exhausted after {attempts} attempts ({elapsed:?} elapsed): {last}")]
pub struct Exhausted<E> {
    /// Number of attempts performed.
    pub attempts: u32,
    /// Time spent in the loop, including waits.
    pub elapsed: Duration,
    /// Failure observed on the final attempt.
    pub last: E,
}

/// Observation reported by one poll of a long-running operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Progress<T> {
    /// The operation reached a terminal state.
    Done(T),
    /// The operation is still running; carries the observed state.
    Running(String),
}

/// Non-terminal observation recorded by [`Retrier::poll`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Stalled<E> {
    /// The probe itself failed.
    #[error("{0}")]
    Failed(E),
    /// The probe succeeded but the operation had not finished.
    #[error("still running with status {0}")]
    Running(String),
}

/// Stateless retry executor driven by a policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Retrier<P> {
    policy: P,
}

impl<P> Retrier<P> {
    /// Creates a retrier for the supplied policy.
    #[must_use]
    pub const fn new(policy: P) -> Self {
        Self { policy }
    }

    /// Borrows the policy.
    #[must_use]
    pub const fn policy(&self) -> &P {
        &self.policy
    }

    /// Awaits `operation` until it succeeds or the policy gives up.
    ///
    /// Success returns immediately without a trailing wait.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] wrapping the last error when the policy declines
    /// another attempt or the wall-clock ceiling has elapsed.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, Exhausted<E>>
    where
        P: RetryPolicy<E>,
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let ceiling = RetryPolicy::<E>::ceiling(&self.policy);
        let ceiling_reached = || ceiling.is_some_and(|limit| started.elapsed() >= limit);
        let mut attempts: u32 = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempts = attempts.saturating_add(1);

            let exhausted = |last: E| Exhausted {
                attempts,
                elapsed: started.elapsed(),
                last,
            };

            let Some(wait) = self.policy.decide(attempts, &error).wait() else {
                return Err(exhausted(error));
            };
            if ceiling_reached() {
                return Err(exhausted(error));
            }

            tracing::debug!(attempt = attempts, wait = ?wait, error = %error, "retrying");
            sleep(wait).await;

            if ceiling_reached() {
                return Err(exhausted(error));
            }
        }
    }

    /// Awaits `probe` until it reports [`Progress::Done`].
    ///
    /// A [`Progress::Running`] observation and a probe error both consume one
    /// attempt from the same budget and wait the same interval, so the timing
    /// of a poll loop matches a retry loop driven by the same policy.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] carrying the last [`Stalled`] observation when
    /// the budget runs out.
    pub async fn poll<T, E, F, Fut>(&self, mut probe: F) -> Result<T, Exhausted<Stalled<E>>>
    where
        P: RetryPolicy<Stalled<E>>,
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Progress<T>, E>>,
    {
        self.run(|| {
            let observation = probe();
            async move {
                match observation.await {
                    Ok(Progress::Done(value)) => Ok(value),
                    Ok(Progress::Running(state)) => Err(Stalled::Running(state)),
                    Err(error) => Err(Stalled::Failed(error)),
                }
            }
        })
        .await
    }
}
