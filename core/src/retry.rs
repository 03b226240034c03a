//! Retry eligibility and backoff.
//!
//! # Design
//! `RetryPolicy::decide` is a pure function of one attempt's outcome, the
//! zero-based attempt index and the request method. The policy holds no
//! per-call state, so one value is shared by every request a client makes and
//! can be tested without a transport.
//!
//! Eligibility, checked in order:
//! 1. POST never retries.
//! 2. A network failure or timeout (no status) retries.
//! 3. 4xx other than 429 stops.
//! 4. 429 retries.
//! 5. 5xx retries.
//! 6. Anything else stops.
//!
//! An aborted attempt never retries. Once the attempt index reaches
//! `max_retries` the policy stops regardless of the outcome.

use std::time::Duration;

use crate::http::{AttemptOutcome, FailureKind, HttpMethod};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound applied to a server-provided `Retry-After`.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt`.
    Exponential { base: Duration },
    Constant(Duration),
}

impl Backoff {
    /// Delay before the retry that follows attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            Backoff::Constant(delay) => *delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: DEFAULT_BASE_DELAY,
        }
    }
}

/// Whether to try again, and after how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }

    pub fn retry(delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    jitter: bool,
    respect_retry_after: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
            jitter: false,
            respect_retry_after: true,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self::new(0, Backoff::Constant(Duration::ZERO))
    }

    /// Adds up to 20% random extra delay on top of the backoff.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Honors a `Retry-After` header (in seconds) on retried 429 and 503
    /// responses, capped at [`MAX_RETRY_AFTER`].
    pub fn with_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn decide(&self, outcome: &AttemptOutcome, attempt: u32, method: HttpMethod) -> RetryDecision {
        if attempt >= self.max_retries || !is_retryable(outcome, method) {
            return RetryDecision::stop();
        }

        let mut delay = self.backoff.delay(attempt);
        if self.jitter {
            delay += delay.mul_f64(0.2 * fastrand::f64());
        }
        if self.respect_retry_after {
            if let Some(wait) = retry_after(outcome) {
                delay = delay.max(wait.min(MAX_RETRY_AFTER));
            }
        }
        RetryDecision::retry(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Backoff::default())
    }
}

/// Eligibility rules, ignoring the retry budget.
pub fn is_retryable(outcome: &AttemptOutcome, method: HttpMethod) -> bool {
    if !method.is_idempotent() {
        return false;
    }
    match outcome {
        AttemptOutcome::TransportFailure { kind, .. } => {
            matches!(kind, FailureKind::Network | FailureKind::Timeout)
        }
        AttemptOutcome::Success(response) => match response.status {
            429 => true,
            400..=499 => false,
            500..=u16::MAX => true,
            _ => false,
        },
    }
}

fn retry_after(outcome: &AttemptOutcome) -> Option<Duration> {
    let AttemptOutcome::Success(response) = outcome else {
        return None;
    };
    if !matches!(response.status, 429 | 503) {
        return None;
    }
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
