// Retry / backoff policy

use crate::domain::FailureKind;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job (with backoff delay in ms)
    Retry(i64),
    /// Attempt budget spent or failure not retryable; job fails permanently
    Exhausted,
}

/// Exponential backoff retry policy
///
/// Pure decision over `(attempts, max_attempts, kind)`:
/// delay = base_delay * 2^(attempts-1), capped at `max_delay_ms`, with a
/// deterministic ±10% jitter seeded by the job id so a herd of failing jobs
/// does not retry in lockstep. Non-retryable kinds short-circuit regardless
/// of the remaining budget.
pub struct RetryPolicy {
    base_delay_ms: i64,
    max_delay_ms: i64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: i64, max_delay_ms: i64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Decide whether a failed attempt is rescheduled
    ///
    /// # Arguments
    /// * `job_id` - jitter seed
    /// * `attempts` - attempts executed so far (1-based, incremented by claim)
    /// * `max_attempts` - attempt ceiling
    /// * `kind` - failure classification of this attempt
    pub fn decide(
        &self,
        job_id: &str,
        attempts: i32,
        max_attempts: i32,
        kind: FailureKind,
    ) -> RetryDecision {
        if !kind.is_retryable() {
            warn!(job_id = %job_id, kind = %kind, "Failure is not retryable");
            return RetryDecision::Exhausted;
        }

        if attempts >= max_attempts {
            warn!(
                job_id = %job_id,
                attempts = %attempts,
                max_attempts = %max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Exhausted;
        }

        // 2^(attempts-1), exponent clamped so the shift cannot overflow
        let exponent = (attempts - 1).clamp(0, 30) as u32;
        let raw_delay = self
            .base_delay_ms
            .saturating_mul(1i64 << exponent)
            .min(self.max_delay_ms);

        // Apply ±10% jitter to prevent thundering-herd retries.
        // Seeded from the job id: deterministic per job, so consecutive
        // delays of the same job stay monotonic.
        let jitter_seed = job_id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = ((raw_delay as f64 * jitter_factor) as i64).min(self.max_delay_ms);

        info!(
            job_id = %job_id,
            attempt = %attempts,
            max_attempts = %max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}
