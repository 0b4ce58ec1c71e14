// Job Domain Model

use serde::{Deserialize, Serialize};

/// Job ID (UUID v4)
pub type JobId = String;

/// Priority (higher number = higher priority)
pub type Priority = i32;

/// Job lifecycle state
///
/// `Completed`, `Failed` and `Cancelled` are terminal: a job that reaches one
/// of them never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "WAITING",
            JobState::Delayed => "DELAYED",
            JobState::Active => "ACTIVE",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "WAITING" => Some(JobState::Waiting),
            "DELAYED" => Some(JobState::Delayed),
            "ACTIVE" => Some(JobState::Active),
            "COMPLETED" => Some(JobState::Completed),
            "FAILED" => Some(JobState::Failed),
            "CANCELLED" => Some(JobState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job Type
///
/// Closed set: the handler registry is keyed by this enum, so adding a job
/// type is a compile-time change, not a runtime string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    FileProcessing,
    AiTextAnalysis,
    AiImageAnalysis,
    AudioTranscription,
    EmailNotification,
    TempFileCleanup,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FileProcessing => "FILE_PROCESSING",
            JobType::AiTextAnalysis => "AI_TEXT_ANALYSIS",
            JobType::AiImageAnalysis => "AI_IMAGE_ANALYSIS",
            JobType::AudioTranscription => "AUDIO_TRANSCRIPTION",
            JobType::EmailNotification => "EMAIL_NOTIFICATION",
            JobType::TempFileCleanup => "TEMP_FILE_CLEANUP",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "FILE_PROCESSING" => Some(JobType::FileProcessing),
            "AI_TEXT_ANALYSIS" => Some(JobType::AiTextAnalysis),
            "AI_IMAGE_ANALYSIS" => Some(JobType::AiImageAnalysis),
            "AUDIO_TRANSCRIPTION" => Some(JobType::AudioTranscription),
            "EMAIL_NOTIFICATION" => Some(JobType::EmailNotification),
            "TEMP_FILE_CLEANUP" => Some(JobType::TempFileCleanup),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure classification recorded on the job
///
/// `Handler` and `Timeout` are transient and subject to the retry policy.
/// The rest short-circuit to a terminal FAILED state regardless of the
/// remaining attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Handler,
    Timeout,
    UnknownJobType,
    Cancelled,
    NonRetryable,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Handler | FailureKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Handler => "HANDLER",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::UnknownJobType => "UNKNOWN_JOB_TYPE",
            FailureKind::Cancelled => "CANCELLED",
            FailureKind::NonRetryable => "NON_RETRYABLE",
        }
    }

    pub fn parse(s: &str) -> Option<FailureKind> {
        match s {
            "HANDLER" => Some(FailureKind::Handler),
            "TIMEOUT" => Some(FailureKind::Timeout),
            "UNKNOWN_JOB_TYPE" => Some(FailureKind::UnknownJobType),
            "CANCELLED" => Some(FailureKind::Cancelled),
            "NON_RETRYABLE" => Some(FailureKind::NonRetryable),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job Payload (JSON serializable)
///
/// Opaque to the engine; only the registered handler interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: JobType,
    pub payload: JobPayload,

    pub priority: Priority,
    pub state: JobState,

    /// Execution attempts so far. Incremented by the claim, never exceeds
    /// `max_attempts`.
    pub attempts: i32,
    pub max_attempts: i32,

    /// Progress in [0,100], writable only while ACTIVE, reset to 0 on claim.
    pub progress: i32,

    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,

    /// Earliest eligible run time (delay / backoff scheduling).
    pub not_before: i64,

    /// Advisory cooperative-cancellation flag for ACTIVE jobs.
    pub cancel_requested: bool,
}

impl Job {
    /// Create a new Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue` - Queue name
    /// * `job_type` - Job type
    /// * `payload` - Job payload
    /// * `delay_ms` - Initial scheduling delay; > 0 creates the job DELAYED
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue: impl Into<String>,
        job_type: JobType,
        payload: JobPayload,
        delay_ms: i64,
    ) -> Self {
        let (state, not_before) = if delay_ms > 0 {
            (JobState::Delayed, created_at + delay_ms)
        } else {
            (JobState::Waiting, created_at)
        };

        Self {
            id: id.into(),
            queue: queue.into(),
            job_type,
            payload,
            priority: 0,
            state,
            attempts: 0,
            max_attempts: 3,
            progress: 0,
            result: None,
            error: None,
            error_kind: None,
            created_at,
            updated_at: created_at,
            not_before,
            cancel_requested: false,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(queue: impl Into<String>, job_type: JobType, payload: JobPayload) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(id, created_at, queue, job_type, payload, 0)
    }

    /// Transition WAITING -> ACTIVE (worker claim)
    ///
    /// Increments the attempt counter and resets progress. The repository
    /// performs this atomically in SQL; this method is the reference
    /// semantics used by the in-memory mock.
    pub fn claim(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.state != JobState::Waiting {
            return Err(invalid_transition(self.state, JobState::Active));
        }
        self.state = JobState::Active;
        self.attempts += 1;
        self.progress = 0;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition DELAYED -> WAITING once `not_before` has elapsed
    pub fn promote(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.state != JobState::Delayed {
            return Err(invalid_transition(self.state, JobState::Waiting));
        }
        if now_millis < self.not_before {
            return Err(crate::domain::error::DomainError::ValidationError(format!(
                "job {} not due until {}",
                self.id, self.not_before
            )));
        }
        self.state = JobState::Waiting;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition ACTIVE -> COMPLETED with the handler result
    pub fn complete(
        &mut self,
        result: serde_json::Value,
        now_millis: i64,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(invalid_transition(self.state, JobState::Completed));
        }
        self.state = JobState::Completed;
        self.result = Some(result);
        self.progress = 100;
        // A success after retried failures clears the failure record
        self.error = None;
        self.error_kind = None;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition ACTIVE -> DELAYED for a retry after `delay_ms`
    pub fn reschedule(
        &mut self,
        error: impl Into<String>,
        kind: FailureKind,
        delay_ms: i64,
        now_millis: i64,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(invalid_transition(self.state, JobState::Delayed));
        }
        self.state = JobState::Delayed;
        self.error = Some(error.into());
        self.error_kind = Some(kind);
        self.not_before = now_millis + delay_ms;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition ACTIVE -> FAILED (terminal)
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        kind: FailureKind,
        now_millis: i64,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(invalid_transition(self.state, JobState::Failed));
        }
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.error_kind = Some(kind);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition WAITING/DELAYED -> CANCELLED (terminal)
    ///
    /// Only pending jobs can be cancelled outright; an ACTIVE job receives
    /// the advisory `cancel_requested` flag instead.
    pub fn cancel(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if !matches!(self.state, JobState::Waiting | JobState::Delayed) {
            return Err(invalid_transition(self.state, JobState::Cancelled));
        }
        self.state = JobState::Cancelled;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record a progress update (ACTIVE only, monotonic non-decreasing)
    pub fn report_progress(
        &mut self,
        progress: i32,
        now_millis: i64,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Active {
            return Err(crate::domain::error::DomainError::ValidationError(format!(
                "progress update on {} job {}",
                self.state, self.id
            )));
        }
        self.progress = self.progress.max(progress.clamp(0, 100));
        self.updated_at = now_millis;
        Ok(())
    }
}

fn invalid_transition(from: JobState, to: JobState) -> crate::domain::error::DomainError {
    crate::domain::error::DomainError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
