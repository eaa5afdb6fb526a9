//! Retry policy for failed media requests.
//!
//! Bounded attempts with a fixed or exponential delay between them.

use std::time::Duration;

use super::models::DownloadError;

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffSchedule {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `initial * multiplier^n` before retry `n` (0-based), capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// Retry policy for a single media item.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub schedule: BackoffSchedule,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, schedule: BackoffSchedule) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule,
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, BackoffSchedule::Fixed(Duration::ZERO))
    }

    /// Check if an error should be retried after `attempts_made` attempts.
    ///
    /// Returns true if:
    /// - The error type is retryable (e.g., not NotFound)
    /// - Another attempt is still within `max_attempts`
    pub fn should_retry(&self, error: &DownloadError, attempts_made: u32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }

    /// Delay to wait before retry number `retry` (0 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match &self.schedule {
            BackoffSchedule::Fixed(delay) => *delay,
            BackoffSchedule::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            schedule: BackoffSchedule::Fixed(Duration::from_secs(2)),
        }
    }
}
