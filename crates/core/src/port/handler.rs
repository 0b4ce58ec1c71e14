// Job Handler Port
// Abstraction for the business logic invoked per job type

use crate::domain::{FailureKind, JobId, JobPayload, JobType};
use crate::port::{JobRepository, TimeProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Handler failure, classified for the retry policy
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Transient failure (e.g. a rate-limited AI provider), retried with backoff
    #[error("Handler failure: {0}")]
    Failure(String),

    /// Permanent failure, never retried
    #[error("Non-retryable failure: {0}")]
    NonRetryable(String),

    /// Handler observed the cancellation signal and stopped
    #[error("Job cancelled by request")]
    Cancelled,
}

impl HandlerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HandlerError::Failure(_) => FailureKind::Handler,
            HandlerError::NonRetryable(_) => FailureKind::NonRetryable,
            HandlerError::Cancelled => FailureKind::Cancelled,
        }
    }
}

pub type HandlerResult = std::result::Result<serde_json::Value, HandlerError>;

/// Per-invocation context handed to a handler
///
/// Exposes write-through progress reporting and the cooperative
/// cancellation signal. Both go through the status store so they survive
/// the process and are visible to status queries.
pub struct JobContext {
    job_id: JobId,
    attempt: i32,
    repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        attempt: i32,
        repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_id,
            attempt,
            repo,
            time_provider,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Attempt number of this invocation (1-based)
    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    /// Report progress in [0,100]
    ///
    /// Last-write-wins; the store keeps it monotonic within the attempt.
    /// Errors are swallowed: a progress write must never fail the job.
    pub async fn report_progress(&self, progress: u8) {
        let now = self.time_provider.now_millis();
        if let Err(e) = self
            .repo
            .update_progress(&self.job_id, i64::from(progress).min(100) as i32, now)
            .await
        {
            tracing::warn!(job_id = %self.job_id, error = %e, "Progress update dropped");
        }
    }

    /// Check the advisory cancellation flag
    ///
    /// A handler may poll this between units of work and return
    /// `HandlerError::Cancelled`, or ignore it and finish naturally.
    pub async fn is_cancel_requested(&self) -> bool {
        self.repo
            .cancel_requested(&self.job_id)
            .await
            .unwrap_or(false)
    }
}

/// Business-logic function for one job type
///
/// Handlers are registered once at startup and invoked by workers with the
/// job payload. Long-running/suspending work (network calls to an AI
/// provider, file IO) is expected.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: &JobPayload, ctx: &JobContext) -> HandlerResult;
}

/// Typed handler registry (JobType -> handler)
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type
    ///
    /// Duplicate registration is a wiring bug and fails loudly.
    pub fn register(
        &mut self,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
    ) -> crate::error::Result<()> {
        if self.handlers.insert(job_type, handler).is_some() {
            return Err(crate::error::AppError::Validation(format!(
                "handler already registered for {}",
                job_type
            )));
        }
        Ok(())
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed with the given result
        Success(serde_json::Value),
        /// Always fail with a transient error
        Fail(String),
        /// Fail the first N invocations, then succeed
        FailTimes(usize, String),
        /// Always fail with a non-retryable error
        FailNonRetryable(String),
        /// Panic (for panic isolation testing)
        Panic(String),
        /// Sleep for the duration, then succeed (for timeout testing)
        Sleep(Duration),
        /// Return Cancelled if the flag is set, succeed otherwise
        ObserveCancel,
    }

    /// Mock Job Handler for testing
    ///
    /// Counts invocations and tracks the maximum number of concurrent
    /// invocations observed (for claim-exclusivity assertions).
    pub struct MockHandler {
        behavior: MockBehavior,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success(serde_json::json!({"ok": true})))
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_concurrency(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for MockHandler {
        async fn run(&self, _payload: &JobPayload, ctx: &JobContext) -> HandlerResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            // Yield so overlapping invocations would actually overlap.
            tokio::time::sleep(Duration::from_millis(5)).await;

            let result = match &self.behavior {
                MockBehavior::Success(value) => Ok(value.clone()),
                MockBehavior::Fail(msg) => Err(HandlerError::Failure(msg.clone())),
                MockBehavior::FailTimes(n, msg) => {
                    if call <= *n {
                        Err(HandlerError::Failure(msg.clone()))
                    } else {
                        Ok(serde_json::json!({"ok": true, "attempt": ctx.attempt()}))
                    }
                }
                MockBehavior::FailNonRetryable(msg) => {
                    Err(HandlerError::NonRetryable(msg.clone()))
                }
                MockBehavior::Panic(msg) => panic!("{}", msg.clone()),
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(serde_json::json!({"ok": true}))
                }
                MockBehavior::ObserveCancel => {
                    if ctx.is_cancel_requested().await {
                        Err(HandlerError::Cancelled)
                    } else {
                        Ok(serde_json::json!({"ok": true}))
                    }
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
