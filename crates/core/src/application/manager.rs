// Job Manager - public entry point of the engine

use crate::domain::{FailureKind, Job, JobId, JobPayload, JobState, JobType, QueueConfig};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Per-enqueue options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Initial scheduling delay; > 0 creates the job DELAYED
    #[serde(default)]
    pub delay_ms: i64,
    /// Attempt ceiling (must be >= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Higher dequeues first among simultaneously eligible jobs
    #[serde(default)]
    pub priority: i32,
}

fn default_max_attempts() -> i32 {
    3
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            max_attempts: default_max_attempts(),
            priority: 0,
        }
    }
}

/// Read-only view of a job for status queries
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub queue: String,
    pub job_type: JobType,
    pub state: JobState,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub progress: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub created_at: i64,
    pub updated_at: i64,
    pub not_before: i64,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            queue: job.queue,
            job_type: job.job_type,
            state: job.state,
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            progress: job.progress,
            result: job.result,
            error: job.error,
            error_kind: job.error_kind,
            created_at: job.created_at,
            updated_at: job.updated_at,
            not_before: job.not_before,
        }
    }
}

/// Point-in-time per-state counts for one queue
///
/// Each count is individually accurate at read time; no snapshot
/// consistency across them.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Job Manager
///
/// Explicitly constructed and dependency-injected; owns the set of
/// registered queues. Enqueue/status/cancel/stats never block on job
/// execution.
pub struct JobManager {
    queues: HashMap<String, QueueConfig>,
    job_repo: Arc<dyn JobRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobManager {
    pub fn new(
        queues: Vec<QueueConfig>,
        job_repo: Arc<dyn JobRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queues: queues.into_iter().map(|q| (q.name.clone(), q)).collect(),
            job_repo,
            id_provider,
            time_provider,
        }
    }

    pub fn queue_config(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.get(name)
    }

    pub fn queue_configs(&self) -> impl Iterator<Item = &QueueConfig> {
        self.queues.values()
    }

    /// Enqueue a job
    ///
    /// Validates the queue is registered, persists the record in WAITING
    /// (or DELAYED if a delay was requested) and returns its id.
    pub async fn enqueue(
        &self,
        queue: &str,
        job_type: JobType,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        if !self.queues.contains_key(queue) {
            return Err(AppError::UnknownQueue(queue.to_string()));
        }
        if options.max_attempts < 1 {
            return Err(AppError::Validation(format!(
                "max_attempts must be >= 1, got {}",
                options.max_attempts
            )));
        }
        if options.delay_ms < 0 {
            return Err(AppError::Validation(format!(
                "delay_ms must be >= 0, got {}",
                options.delay_ms
            )));
        }

        let job_id = self.id_provider.generate_id();
        let created_at = self.time_provider.now_millis();

        let mut job = Job::new(
            job_id.clone(),
            created_at,
            queue,
            job_type,
            JobPayload::new(payload),
            options.delay_ms,
        );
        job.max_attempts = options.max_attempts;
        job.priority = options.priority;

        self.job_repo.insert(&job).await?;

        info!(
            job_id = %job_id,
            queue = %queue,
            job_type = %job_type,
            state = %job.state,
            "Job enqueued"
        );

        Ok(job_id)
    }

    /// Current job state, read from the status store
    pub async fn status(&self, queue: &str, job_id: &JobId) -> Result<JobView> {
        let job = self.find_in_queue(queue, job_id).await?;
        Ok(JobView::from(job))
    }

    /// Cancel a job
    ///
    /// Pending jobs (WAITING/DELAYED) are cancelled outright and the handler
    /// is guaranteed never to run. For an ACTIVE job only the advisory
    /// cooperative-cancellation flag is set. Terminal jobs fail with
    /// InvalidState.
    pub async fn cancel(&self, queue: &str, job_id: &JobId) -> Result<()> {
        let job = self.find_in_queue(queue, job_id).await?;
        let now = self.time_provider.now_millis();

        match job.state {
            JobState::Waiting | JobState::Delayed => {
                if self.job_repo.cancel_pending(job_id, now).await? > 0 {
                    info!(job_id = %job_id, "Job cancelled");
                    return Ok(());
                }
                // Raced into another state between read and update; retry on
                // the fresh state exactly once.
                let job = self.find_in_queue(queue, job_id).await?;
                match job.state {
                    JobState::Active => self.request_active_cancel(job_id, now).await,
                    state => Err(AppError::InvalidState(format!(
                        "cannot cancel job {} in state {}",
                        job_id, state
                    ))),
                }
            }
            JobState::Active => self.request_active_cancel(job_id, now).await,
            state => Err(AppError::InvalidState(format!(
                "cannot cancel job {} in state {}",
                job_id, state
            ))),
        }
    }

    /// Point-in-time per-state counts for a queue
    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        if !self.queues.contains_key(queue) {
            return Err(AppError::UnknownQueue(queue.to_string()));
        }
        Ok(QueueStats {
            waiting: self.job_repo.count_by_state(queue, JobState::Waiting).await?,
            delayed: self.job_repo.count_by_state(queue, JobState::Delayed).await?,
            active: self.job_repo.count_by_state(queue, JobState::Active).await?,
            completed: self
                .job_repo
                .count_by_state(queue, JobState::Completed)
                .await?,
            failed: self.job_repo.count_by_state(queue, JobState::Failed).await?,
            cancelled: self
                .job_repo
                .count_by_state(queue, JobState::Cancelled)
                .await?,
        })
    }

    async fn request_active_cancel(&self, job_id: &JobId, now: i64) -> Result<()> {
        self.job_repo.request_cancel(job_id, now).await?;
        info!(job_id = %job_id, "Cooperative cancellation requested");
        Ok(())
    }

    /// Look up a job, treating an id from another queue as unknown
    async fn find_in_queue(&self, queue: &str, job_id: &JobId) -> Result<Job> {
        if !self.queues.contains_key(queue) {
            return Err(AppError::UnknownQueue(queue.to_string()));
        }
        match self.job_repo.find_by_id(job_id).await? {
            Some(job) if job.queue == queue => Ok(job),
            _ => Err(AppError::NotFound(format!(
                "Job {} not found in queue {}",
                job_id, queue
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::time_provider::mocks::MockTimeProvider;

    fn manager() -> (JobManager, Arc<InMemoryJobRepository>, Arc<MockTimeProvider>) {
        let repo = Arc::new(InMemoryJobRepository::new());
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let mgr = JobManager::new(
            vec![
                QueueConfig::new("file-processing", 2),
                QueueConfig::new("notification", 4),
            ],
            repo.clone(),
            Arc::new(SequentialIdProvider::new()),
            time.clone(),
        );
        (mgr, repo, time)
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_queue() {
        let (mgr, _, _) = manager();
        let err = mgr
            .enqueue(
                "no-such-queue",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownQueue(_)));
    }

    #[tokio::test]
    async fn enqueue_validates_options() {
        let (mgr, _, _) = manager();
        let err = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions {
                    max_attempts: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions {
                    delay_ms: -5,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn enqueue_without_delay_is_waiting() {
        let (mgr, _, _) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({"file": "a"}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let view = mgr.status("file-processing", &id).await.unwrap();
        assert_eq!(view.state, JobState::Waiting);
        assert_eq!(view.not_before, view.created_at);
        assert_eq!(view.attempts, 0);
    }

    #[tokio::test]
    async fn enqueue_with_delay_is_delayed() {
        let (mgr, _, _) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::AiTextAnalysis,
                serde_json::json!({}),
                EnqueueOptions {
                    delay_ms: 5000,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let view = mgr.status("file-processing", &id).await.unwrap();
        assert_eq!(view.state, JobState::Delayed);
        assert_eq!(view.not_before, view.created_at + 5000);
    }

    #[tokio::test]
    async fn status_is_not_found_across_queues() {
        let (mgr, _, _) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        assert!(mgr.status("file-processing", &id).await.is_ok());
        let err = mgr.status("notification", &id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = mgr
            .status("file-processing", &"missing".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_pending_job_is_guaranteed() {
        let (mgr, _, _) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        mgr.cancel("file-processing", &id).await.unwrap();
        let view = mgr.status("file-processing", &id).await.unwrap();
        assert_eq!(view.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_invalid_state() {
        let (mgr, _, _) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        mgr.cancel("file-processing", &id).await.unwrap();
        // Second cancel: already CANCELLED, terminal
        let err = mgr.cancel("file-processing", &id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        // State unchanged
        let view = mgr.status("file-processing", &id).await.unwrap();
        assert_eq!(view.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_active_job_sets_advisory_flag() {
        let (mgr, repo, time) = manager();
        let id = mgr
            .enqueue(
                "file-processing",
                JobType::FileProcessing,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let claimed = repo
            .claim_next("file-processing", time.now_millis())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, id);

        mgr.cancel("file-processing", &id).await.unwrap();
        assert!(repo.cancel_requested(&id).await.unwrap());
        // Still active: cancellation of in-flight work is advisory
        let view = mgr.status("file-processing", &id).await.unwrap();
        assert_eq!(view.state, JobState::Active);
    }

    #[tokio::test]
    async fn queue_stats_counts_states() {
        let (mgr, repo, time) = manager();
        for _ in 0..3 {
            mgr.enqueue(
                "notification",
                JobType::EmailNotification,
                serde_json::json!({}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        }
        repo.claim_next("notification", time.now_millis())
            .await
            .unwrap()
            .unwrap();

        let stats = mgr.queue_stats("notification").await.unwrap();
        assert_eq!(stats.waiting, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 0);

        assert!(matches!(
            mgr.queue_stats("nope").await.unwrap_err(),
            AppError::UnknownQueue(_)
        ));
    }
}
