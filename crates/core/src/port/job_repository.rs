// Job Repository Port (Interface)

use crate::domain::{FailureKind, Job, JobId, JobState};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// The status store and pending index of the engine. Implementations must
/// support safe concurrent access from many callers and workers; mutations
/// to a single record are serialized (single-writer-at-a-time), different
/// records mutate in parallel.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Atomically claim the next eligible job from a queue
    ///
    /// Picks the WAITING job with `not_before <= now`, ordered by priority
    /// (descending) then created_at (FIFO tie-break), transitions it to
    /// ACTIVE, increments `attempts` and resets `progress`. Two racing
    /// workers must see exactly one winner.
    async fn claim_next(&self, queue: &str, now_millis: i64) -> Result<Option<Job>>;

    /// Promote due DELAYED jobs to WAITING (`not_before <= now`)
    ///
    /// Returns the number of jobs promoted.
    async fn promote_due(&self, queue: &str, now_millis: i64) -> Result<u64>;

    /// Record handler success: ACTIVE -> COMPLETED with result
    async fn complete(
        &self,
        id: &JobId,
        result: &serde_json::Value,
        now_millis: i64,
    ) -> Result<()>;

    /// Record a retryable failure: ACTIVE -> DELAYED with backoff `not_before`
    async fn reschedule(
        &self,
        id: &JobId,
        error: &str,
        kind: FailureKind,
        not_before: i64,
        now_millis: i64,
    ) -> Result<()>;

    /// Record a permanent failure: ACTIVE -> FAILED (terminal)
    async fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        kind: FailureKind,
        now_millis: i64,
    ) -> Result<()>;

    /// Cancel a pending job: WAITING/DELAYED -> CANCELLED
    ///
    /// Conditional update; returns the number of rows affected (0 means the
    /// job raced into another state and the caller must re-inspect).
    async fn cancel_pending(&self, id: &JobId, now_millis: i64) -> Result<u64>;

    /// Set the advisory cancellation flag on an ACTIVE job
    async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<()>;

    /// Read the advisory cancellation flag
    async fn cancel_requested(&self, id: &JobId) -> Result<bool>;

    /// Write-through progress update (last-write-wins, monotonic via MAX)
    ///
    /// Only applies while the job is ACTIVE; also refreshes `updated_at` so
    /// a progressing job is never mistaken for a dead one.
    async fn update_progress(&self, id: &JobId, progress: i32, now_millis: i64) -> Result<()>;

    /// Liveness heartbeat: refresh `updated_at` of an ACTIVE job
    async fn touch(&self, id: &JobId, now_millis: i64) -> Result<()>;

    /// Count jobs by state within a queue
    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64>;

    /// Find ACTIVE jobs whose `updated_at` is older than the cutoff
    /// (candidates for the liveness sweep)
    async fn find_stale_active(&self, cutoff_millis: i64) -> Result<Vec<Job>>;

    /// Find all jobs by state
    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory JobRepository for core-level tests
    ///
    /// A coarse mutex around a HashMap; claim exclusivity follows from the
    /// lock being held across the select-and-transition.
    pub struct InMemoryJobRepository {
        jobs: Mutex<HashMap<JobId, Job>>,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
            }
        }

        fn with_job<T>(
            &self,
            id: &JobId,
            f: impl FnOnce(&mut Job) -> Result<T>,
        ) -> Result<T> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            f(job)
        }
    }

    impl Default for InMemoryJobRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Database(format!("duplicate job id {}", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn claim_next(&self, queue: &str, now_millis: i64) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut eligible: Vec<&Job> = jobs
                .values()
                .filter(|j| {
                    j.queue == queue && j.state == JobState::Waiting && j.not_before <= now_millis
                })
                .collect();
            eligible.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
            let id = match eligible.first() {
                Some(j) => j.id.clone(),
                None => return Ok(None),
            };
            let job = jobs.get_mut(&id).unwrap();
            job.claim(now_millis)?;
            Ok(Some(job.clone()))
        }

        async fn promote_due(&self, queue: &str, now_millis: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut promoted = 0;
            for job in jobs.values_mut() {
                if job.queue == queue
                    && job.state == JobState::Delayed
                    && job.not_before <= now_millis
                {
                    job.promote(now_millis)?;
                    promoted += 1;
                }
            }
            Ok(promoted)
        }

        async fn complete(
            &self,
            id: &JobId,
            result: &serde_json::Value,
            now_millis: i64,
        ) -> Result<()> {
            self.with_job(id, |job| Ok(job.complete(result.clone(), now_millis)?))
        }

        async fn reschedule(
            &self,
            id: &JobId,
            error: &str,
            kind: FailureKind,
            not_before: i64,
            now_millis: i64,
        ) -> Result<()> {
            self.with_job(id, |job| {
                Ok(job.reschedule(error, kind, not_before - now_millis, now_millis)?)
            })
        }

        async fn mark_failed(
            &self,
            id: &JobId,
            error: &str,
            kind: FailureKind,
            now_millis: i64,
        ) -> Result<()> {
            self.with_job(id, |job| Ok(job.fail(error, kind, now_millis)?))
        }

        async fn cancel_pending(&self, id: &JobId, now_millis: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) if matches!(job.state, JobState::Waiting | JobState::Delayed) => {
                    job.cancel(now_millis)?;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<()> {
            self.with_job(id, |job| {
                job.cancel_requested = true;
                job.updated_at = now_millis;
                Ok(())
            })
        }

        async fn cancel_requested(&self, id: &JobId) -> Result<bool> {
            self.with_job(id, |job| Ok(job.cancel_requested))
        }

        async fn update_progress(&self, id: &JobId, progress: i32, now_millis: i64) -> Result<()> {
            self.with_job(id, |job| {
                // Progress from a superseded attempt is dropped silently.
                if job.state == JobState::Active {
                    job.report_progress(progress, now_millis)?;
                }
                Ok(())
            })
        }

        async fn touch(&self, id: &JobId, now_millis: i64) -> Result<()> {
            self.with_job(id, |job| {
                if job.state == JobState::Active {
                    job.updated_at = now_millis;
                }
                Ok(())
            })
        }

        async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.queue == queue && j.state == state)
                .count() as i64)
        }

        async fn find_stale_active(&self, cutoff_millis: i64) -> Result<Vec<Job>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.state == JobState::Active && j.updated_at < cutoff_millis)
                .cloned()
                .collect())
        }

        async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
            let mut jobs: Vec<Job> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.state == state)
                .cloned()
                .collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(jobs)
        }
    }

}
