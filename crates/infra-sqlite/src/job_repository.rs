// SQLite JobRepository Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;
use vaultq_core::domain::{FailureKind, Job, JobId, JobPayload, JobState, JobType};
use vaultq_core::error::{AppError, Result};
use vaultq_core::port::JobRepository;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed
                        AppError::Database(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => {
                        // Other database errors
                        AppError::Database(format!(
                            "Database error [{}]: {}",
                            code_str,
                            db_err.message()
                        ))
                    }
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => {
            // Connection, pool, protocol errors
            AppError::Database(err.to_string())
        }
    }
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Re-read a job's state after a conditional update touched 0 rows and
    /// turn the outcome into NotFound / InvalidState.
    async fn explain_zero_rows(&self, id: &JobId, target: JobState) -> AppError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(format!("Job {} not found", id)),
            Ok(Some(state)) => AppError::InvalidState(format!(
                "Cannot move job {} from {} to {}",
                id, state, target
            )),
            Err(e) => map_sqlx_error(e),
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue, job_type, payload, priority, state,
                attempts, max_attempts, progress,
                result, error, error_kind,
                created_at, updated_at, not_before, cancel_requested
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue)
        .bind(job.job_type.as_str())
        .bind(job.payload.as_value().to_string())
        .bind(job.priority)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.progress)
        .bind(job.result.as_ref().map(|v| v.to_string()))
        .bind(&job.error)
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.not_before)
        .bind(if job.cancel_requested { 1 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    async fn claim_next(&self, queue: &str, now_millis: i64) -> Result<Option<Job>> {
        // Single-statement claim: the inner SELECT and the state flip happen
        // atomically, so two racing workers see exactly one winner.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'ACTIVE', attempts = attempts + 1, progress = 0, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = ? AND state = 'WAITING' AND not_before <= ?
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(queue)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    async fn promote_due(&self, queue: &str, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'WAITING', updated_at = ?
            WHERE queue = ? AND state = 'DELAYED' AND not_before <= ?
            "#,
        )
        .bind(now_millis)
        .bind(queue)
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn complete(
        &self,
        id: &JobId,
        result: &serde_json::Value,
        now_millis: i64,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'COMPLETED', progress = 100, result = ?,
                error = NULL, error_kind = NULL, updated_at = ?
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(result.to_string())
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, JobState::Completed).await);
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &JobId,
        error: &str,
        kind: FailureKind,
        not_before: i64,
        now_millis: i64,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'DELAYED', error = ?, error_kind = ?, not_before = ?, updated_at = ?
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(error)
        .bind(kind.as_str())
        .bind(not_before)
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, JobState::Delayed).await);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        kind: FailureKind,
        now_millis: i64,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'FAILED', error = ?, error_kind = ?, updated_at = ?
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(error)
        .bind(kind.as_str())
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, JobState::Failed).await);
        }
        Ok(())
    }

    async fn cancel_pending(&self, id: &JobId, now_millis: i64) -> Result<u64> {
        // Conditional update; 0 rows means the job raced into another state
        // and the caller re-inspects.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'CANCELLED', error_kind = 'CANCELLED', updated_at = ?
            WHERE id = ? AND state IN ('WAITING', 'DELAYED')
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET cancel_requested = 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", id)));
        }
        Ok(())
    }

    async fn cancel_requested(&self, id: &JobId) -> Result<bool> {
        let flag: Option<i64> = sqlx::query_scalar("SELECT cancel_requested FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match flag {
            Some(v) => Ok(v != 0),
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
        }
    }

    async fn update_progress(&self, id: &JobId, progress: i32, now_millis: i64) -> Result<()> {
        // MAX keeps progress monotonic under out-of-order writes; a report
        // landing after the attempt finished touches 0 rows and is dropped.
        sqlx::query(
            r#"
            UPDATE jobs
            SET progress = MAX(progress, MIN(MAX(?, 0), 100)), updated_at = ?
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(progress)
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn touch(&self, id: &JobId, now_millis: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET updated_at = ? WHERE id = ? AND state = 'ACTIVE'")
            .bind(now_millis)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ? AND state = ?")
                .bind(queue)
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_stale_active(&self, cutoff_millis: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = 'ACTIVE' AND updated_at < ?
            ORDER BY updated_at ASC
            "#,
        )
        .bind(cutoff_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_job()).collect()
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_job()).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    job_type: String,
    payload: String,
    priority: i32,
    state: String,
    attempts: i32,
    max_attempts: i32,
    progress: i32,
    result: Option<String>,
    error: Option<String>,
    error_kind: Option<String>,
    created_at: i64,
    updated_at: i64,
    not_before: i64,
    cancel_requested: i32, // SQLite boolean as integer
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let state = JobState::parse(&self.state)
            .ok_or_else(|| AppError::Database(format!("Corrupt job state: {}", self.state)))?;

        let job_type = JobType::parse(&self.job_type)
            .ok_or_else(|| AppError::Database(format!("Corrupt job type: {}", self.job_type)))?;

        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| AppError::Database(format!("Corrupt job payload: {}", e)))?;

        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Database(format!("Corrupt job result: {}", e)))?;

        let error_kind = self.error_kind.as_deref().and_then(FailureKind::parse);

        Ok(Job {
            id: self.id,
            queue: self.queue,
            job_type,
            payload: JobPayload::new(payload),
            priority: self.priority,
            state,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            progress: self.progress,
            result,
            error: self.error,
            error_kind,
            created_at: self.created_at,
            updated_at: self.updated_at,
            not_before: self.not_before,
            cancel_requested: self.cancel_requested != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use vaultq_core::domain::{JobPayload, JobType};

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn waiting_job(queue: &str, priority: i32) -> Job {
        let mut job = Job::new_test(
            queue,
            JobType::FileProcessing,
            JobPayload::new(serde_json::json!({"key": "value"})),
        );
        job.priority = priority;
        job
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.state, JobState::Waiting);
        assert_eq!(found.payload.as_value()["key"], "value");
    }

    #[tokio::test]
    async fn test_claim_next_prefers_priority() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let low = waiting_job("test_queue", 0);
        let high = waiting_job("test_queue", 10);
        repo.insert(&low).await.unwrap();
        repo.insert(&high).await.unwrap();

        let now = high.created_at + 1;
        let claimed = repo.claim_next("test_queue", now).await.unwrap().unwrap();
        assert_eq!(claimed.id, high.id);
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.progress, 0);

        let claimed = repo.claim_next("test_queue", now).await.unwrap().unwrap();
        assert_eq!(claimed.id, low.id);

        assert!(repo.claim_next("test_queue", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_invisible_until_promoted() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = Job::new(
            "delayed-1",
            1_000,
            "test_queue",
            JobType::EmailNotification,
            JobPayload::new(serde_json::json!({})),
            5_000,
        );
        repo.insert(&job).await.unwrap();

        assert_eq!(repo.promote_due("test_queue", 3_000).await.unwrap(), 0);
        assert!(repo.claim_next("test_queue", 3_000).await.unwrap().is_none());

        assert_eq!(repo.promote_due("test_queue", 6_000).await.unwrap(), 1);
        let claimed = repo.claim_next("test_queue", 6_000).await.unwrap().unwrap();
        assert_eq!(claimed.id, "delayed-1");
    }

    #[tokio::test]
    async fn test_complete_requires_active() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        // Not claimed yet: completing a WAITING job is a state conflict
        let err = repo
            .complete(&job.id, &serde_json::json!({"ok": true}), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let now = job.created_at + 1;
        repo.claim_next("test_queue", now).await.unwrap().unwrap();
        repo.complete(&job.id, &serde_json::json!({"ok": true}), now + 1)
            .await
            .unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.state, JobState::Completed);
        assert_eq!(found.progress, 100);
        assert_eq!(found.result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_reschedule_and_mark_failed() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        let now = job.created_at + 1;
        repo.claim_next("test_queue", now).await.unwrap().unwrap();
        repo.reschedule(&job.id, "boom", FailureKind::Handler, now + 2_000, now)
            .await
            .unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.state, JobState::Delayed);
        assert_eq!(found.not_before, now + 2_000);
        assert_eq!(found.error.as_deref(), Some("boom"));
        assert_eq!(found.error_kind, Some(FailureKind::Handler));

        repo.promote_due("test_queue", now + 3_000).await.unwrap();
        repo.claim_next("test_queue", now + 3_000)
            .await
            .unwrap()
            .unwrap();
        repo.mark_failed(&job.id, "boom again", FailureKind::Handler, now + 3_001)
            .await
            .unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.state, JobState::Failed);
        assert_eq!(found.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancel_pending_is_conditional() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        assert_eq!(repo.cancel_pending(&job.id, 10).await.unwrap(), 1);
        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.state, JobState::Cancelled);

        // Terminal job: conditional update touches nothing
        assert_eq!(repo.cancel_pending(&job.id, 20).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_flag_round_trip() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        assert!(!repo.cancel_requested(&job.id).await.unwrap());
        repo.request_cancel(&job.id, 10).await.unwrap();
        assert!(repo.cancel_requested(&job.id).await.unwrap());

        let err = repo.cancel_requested(&"missing".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_active_only() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        // Not ACTIVE yet: silently dropped
        repo.update_progress(&job.id, 50, 10).await.unwrap();
        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.progress, 0);

        let now = job.created_at + 1;
        repo.claim_next("test_queue", now).await.unwrap().unwrap();
        repo.update_progress(&job.id, 60, now + 1).await.unwrap();
        repo.update_progress(&job.id, 40, now + 2).await.unwrap();
        repo.update_progress(&job.id, 150, now + 3).await.unwrap();

        let found = repo.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.progress, 100);
    }

    #[tokio::test]
    async fn test_find_stale_active() {
        let repo = SqliteJobRepository::new(setup_test_db().await);

        let job = waiting_job("test_queue", 0);
        repo.insert(&job).await.unwrap();

        let now = job.created_at + 1;
        repo.claim_next("test_queue", now).await.unwrap().unwrap();

        let stale = repo.find_stale_active(now + 10_000).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);

        // A heartbeat keeps it out of the stale set
        repo.touch(&job.id, now + 20_000).await.unwrap();
        assert!(repo.find_stale_active(now + 10_000).await.unwrap().is_empty());
    }
}
