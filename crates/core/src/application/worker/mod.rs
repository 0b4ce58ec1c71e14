// Worker - Job execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{FailureKind, Job, QueueConfig};
use crate::error::{AppError, Result};
use crate::port::{HandlerRegistry, JobContext, JobHandler, JobRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker processes jobs from one queue
///
/// A queue owns N of these (its pool); each runs an independent claim loop.
/// Exclusivity comes from the repository's atomic claim, not from any
/// coordination between workers.
pub struct Worker {
    queue: QueueConfig,
    job_repo: Arc<dyn JobRepository>,
    registry: Arc<HandlerRegistry>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Worker {
    pub fn new(
        queue: QueueConfig,
        job_repo: Arc<dyn JobRepository>,
        registry: Arc<HandlerRegistry>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue,
            job_repo,
            registry,
            retry_policy,
            time_provider,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Worker started for queue: {}", self.queue.name);
        loop {
            if shutdown.is_shutdown() {
                info!("Worker shutting down for queue: {}", self.queue.name);
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        // No job available, sleep briefly (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("Worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped for queue: {}", self.queue.name);
        Ok(())
    }

    /// Process next job from queue (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let now = self.time_provider.now_millis();

        // Pop check: due DELAYED jobs become WAITING before the claim.
        self.job_repo.promote_due(&self.queue.name, now).await?;

        // Atomic claim (already set ACTIVE, attempts incremented, progress 0)
        let job = match self.job_repo.claim_next(&self.queue.name, now).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = %job.attempts,
            "Processing job"
        );

        let handler = match self.registry.get(job.job_type) {
            Some(h) => h,
            None => {
                // Configuration defect, not a transient fault: terminal, no retry.
                error!(job_id = %job.id, job_type = %job.job_type, "No handler registered");
                self.job_repo
                    .mark_failed(
                        &job.id,
                        &format!("no handler registered for {}", job.job_type),
                        FailureKind::UnknownJobType,
                        self.time_provider.now_millis(),
                    )
                    .await?;
                return Ok(true);
            }
        };

        let outcome = self.execute(handler, &job).await;
        self.record_outcome(&job, outcome).await?;
        Ok(true)
    }

    /// Invoke the handler with panic isolation, timeout and liveness heartbeat
    async fn execute(
        &self,
        handler: Arc<dyn JobHandler>,
        job: &Job,
    ) -> std::result::Result<serde_json::Value, (FailureKind, String)> {
        let ctx = JobContext::new(
            job.id.clone(),
            job.attempts,
            Arc::clone(&self.job_repo),
            Arc::clone(&self.time_provider),
        );
        let payload = job.payload.clone();

        // tokio::spawn isolates handler panics from the worker loop.
        let handle = tokio::task::spawn(async move { handler.run(&payload, &ctx).await });
        let abort = handle.abort_handle();

        // Heartbeat keeps updated_at fresh so a long handler is not reaped
        // by the liveness sweep.
        let heartbeat = {
            let repo = Arc::clone(&self.job_repo);
            let time = Arc::clone(&self.time_provider);
            let job_id = job.id.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
                tick.tick().await; // first tick fires immediately, skip it
                loop {
                    tick.tick().await;
                    if let Err(e) = repo.touch(&job_id, time.now_millis()).await {
                        warn!(job_id = %job_id, error = %e, "Heartbeat failed");
                    }
                }
            })
        };

        let budget = Duration::from_millis(self.queue.handler_timeout_ms.max(1) as u64);
        let execution_result = tokio::time::timeout(budget, handle).await;
        heartbeat.abort();

        match execution_result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(handler_err))) => Err((handler_err.kind(), handler_err.to_string())),
            Ok(Err(join_err)) => {
                // Panic: a thrown error like any other, subject to retry.
                let msg = if join_err.is_panic() {
                    format!("handler panicked: {}", join_err)
                } else {
                    format!("handler task aborted: {}", join_err)
                };
                Err((FailureKind::Handler, msg))
            }
            Err(_elapsed) => {
                abort.abort();
                Err((
                    FailureKind::Timeout,
                    format!("handler exceeded {}ms budget", self.queue.handler_timeout_ms),
                ))
            }
        }
    }

    /// Persist the outcome of one attempt
    async fn record_outcome(
        &self,
        job: &Job,
        outcome: std::result::Result<serde_json::Value, (FailureKind, String)>,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();

        let write = match outcome {
            Ok(value) => {
                info!(job_id = %job.id, "Job completed");
                self.job_repo.complete(&job.id, &value, now).await
            }
            Err((kind, message)) => {
                match self
                    .retry_policy
                    .decide(&job.id, job.attempts, job.max_attempts, kind)
                {
                    RetryDecision::Retry(delay_ms) => {
                        info!(
                            job_id = %job.id,
                            attempt = %job.attempts,
                            delay_ms = %delay_ms,
                            error = %message,
                            "Retrying job after failure"
                        );
                        self.job_repo
                            .reschedule(&job.id, &message, kind, now + delay_ms, now)
                            .await
                    }
                    RetryDecision::Exhausted => {
                        error!(job_id = %job.id, error = %message, "Job failed permanently");
                        self.job_repo.mark_failed(&job.id, &message, kind, now).await
                    }
                }
            }
        };

        // The liveness sweep may have reclaimed the job while we were busy;
        // its verdict wins and ours is discarded.
        match write {
            Err(AppError::InvalidState(msg)) => {
                warn!(job_id = %job.id, "Outcome discarded, job no longer active: {}", msg);
                Ok(())
            }
            other => other,
        }
    }
}

/// Per-queue worker pool
///
/// Spawns `queue.workers` independent worker loops sharing one shutdown
/// token.
pub struct WorkerPool;

impl WorkerPool {
    pub fn spawn(
        queue: QueueConfig,
        job_repo: Arc<dyn JobRepository>,
        registry: Arc<HandlerRegistry>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
        shutdown: ShutdownToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..queue.workers)
            .map(|_| {
                let worker = Worker::new(
                    queue.clone(),
                    Arc::clone(&job_repo),
                    Arc::clone(&registry),
                    Arc::clone(&retry_policy),
                    Arc::clone(&time_provider),
                );
                let token = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.run(token).await {
                        error!(queue = %worker.queue.name, error = %e, "Worker failed");
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPayload, JobState, JobType};
    use crate::port::handler::mocks::{MockBehavior, MockHandler};
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::time_provider::SystemTimeProvider;

    fn setup(
        behavior: Option<MockBehavior>,
    ) -> (Worker, Arc<InMemoryJobRepository>, Option<Arc<MockHandler>>) {
        let repo = Arc::new(InMemoryJobRepository::new());
        let mut registry = HandlerRegistry::new();
        let handler = behavior.map(|b| {
            let h = Arc::new(MockHandler::new(b));
            registry
                .register(JobType::FileProcessing, h.clone() as Arc<dyn JobHandler>)
                .unwrap();
            h
        });
        let worker = Worker::new(
            QueueConfig::new("file-processing", 1).with_handler_timeout_ms(1000),
            repo.clone(),
            Arc::new(registry),
            Arc::new(RetryPolicy::new(10, 1000)),
            Arc::new(SystemTimeProvider),
        );
        (worker, repo, handler)
    }

    async fn enqueue(repo: &InMemoryJobRepository) -> Job {
        let job = Job::new_test(
            "file-processing",
            JobType::FileProcessing,
            JobPayload::new(serde_json::json!({"file": "a.bin"})),
        );
        repo.insert(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn successful_job_completes_with_result() {
        let (worker, repo, handler) = setup(Some(MockBehavior::Success(
            serde_json::json!({"pages": 3}),
        )));
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Completed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.result, Some(serde_json::json!({"pages": 3})));
        assert_eq!(handler.unwrap().call_count(), 1);
    }

    #[tokio::test]
    async fn missing_handler_fails_terminally_without_retry() {
        let (worker, repo, _) = setup(None);
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.error_kind, Some(FailureKind::UnknownJobType));
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn transient_failure_is_rescheduled_with_backoff() {
        let (worker, repo, _) = setup(Some(MockBehavior::Fail("provider 429".into())));
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.error_kind, Some(FailureKind::Handler));
        assert!(stored.error.as_deref().unwrap().contains("provider 429"));
        assert!(stored.not_before > stored.created_at);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal() {
        let (worker, repo, _) = setup(Some(MockBehavior::FailNonRetryable("bad payload".into())));
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.error_kind, Some(FailureKind::NonRetryable));
    }

    #[tokio::test]
    async fn timeout_is_recorded_as_timeout_kind() {
        let (worker, repo, _) = setup(Some(MockBehavior::Sleep(Duration::from_secs(30))));
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        // Timeout is retryable: first attempt lands in DELAYED
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.error_kind, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn panic_does_not_kill_the_worker() {
        let (worker, repo, _) = setup(Some(MockBehavior::Panic("boom".into())));
        let job = enqueue(&repo).await;

        assert!(worker.process_next_job().await.unwrap());

        let stored = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.error_kind, Some(FailureKind::Handler));
        assert!(stored.error.as_deref().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn empty_queue_reports_no_work() {
        let (worker, _, _) = setup(Some(MockBehavior::Success(serde_json::json!({}))));
        assert!(!worker.process_next_job().await.unwrap());
    }
}
