// Liveness sweep - recovery of jobs abandoned by dead workers

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::worker::constants::{DEFAULT_LIVENESS_TIMEOUT_MS, SWEEP_INTERVAL};
use crate::application::worker::ShutdownToken;
use crate::domain::FailureKind;
use crate::error::Result;
use crate::port::{JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Liveness sweeper
///
/// A worker that dies mid-handler leaves its job ACTIVE with a stale
/// heartbeat. The sweep finds such jobs and treats them as failed attempts:
/// they re-enter the retry policy (DELAYED with backoff, or FAILED once the
/// budget is spent). Runs at daemon startup and then periodically.
pub struct LivenessSweeper {
    job_repo: Arc<dyn JobRepository>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    liveness_timeout_ms: i64,
}

impl LivenessSweeper {
    /// # Arguments
    /// * `liveness_timeout_ms` - Optional custom window (default: 5 minutes)
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
        liveness_timeout_ms: Option<i64>,
    ) -> Self {
        Self {
            job_repo,
            retry_policy,
            time_provider,
            liveness_timeout_ms: liveness_timeout_ms.unwrap_or(DEFAULT_LIVENESS_TIMEOUT_MS),
        }
    }

    /// Run one sweep pass
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn sweep_once(&self) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.liveness_timeout_ms;

        let stale = self.job_repo.find_stale_active(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        info!(
            stale_count = stale.len(),
            cutoff = cutoff,
            "Recovering jobs abandoned by dead workers"
        );

        let mut recovered = 0;
        for job in stale {
            let message = format!(
                "worker lost liveness (last heartbeat {}ms ago)",
                now - job.updated_at
            );

            let outcome = match self.retry_policy.decide(
                &job.id,
                job.attempts,
                job.max_attempts,
                FailureKind::Handler,
            ) {
                RetryDecision::Retry(delay_ms) => {
                    self.job_repo
                        .reschedule(&job.id, &message, FailureKind::Handler, now + delay_ms, now)
                        .await
                }
                RetryDecision::Exhausted => {
                    self.job_repo
                        .mark_failed(&job.id, &message, FailureKind::Handler, now)
                        .await
                }
            };

            match outcome {
                Ok(()) => recovered += 1,
                // The owning worker may have come back between find and
                // update; skip and let its outcome stand.
                Err(e) => warn!(job_id = %job.id, error = %e, "Sweep skipped job"),
            }
        }

        info!(recovered = recovered, "Liveness sweep complete");
        Ok(recovered)
    }

    /// Periodic sweep loop (spawn in the daemon)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            liveness_timeout_ms = self.liveness_timeout_ms,
            "Liveness sweeper started"
        );
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Liveness sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Liveness sweeper stopped");
                    break;
                }
            }
        }
    }
}
