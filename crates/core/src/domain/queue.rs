// Queue Domain Model

/// Queue identifier
pub type QueueId = String;

/// Queue configuration
///
/// A queue is the unit of concurrency configuration: each one owns its own
/// worker pool so a slow AI-analysis queue cannot starve fast notification
/// jobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: QueueId,
    /// Number of concurrent worker loops for this queue.
    pub workers: usize,
    /// Wall-clock budget for a single handler invocation (ms).
    pub handler_timeout_ms: i64,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers: workers.max(1),
            handler_timeout_ms: DEFAULT_HANDLER_TIMEOUT_MS,
        }
    }

    pub fn with_handler_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.handler_timeout_ms = timeout_ms;
        self
    }
}

/// Default per-job execution budget (10 minutes)
pub const DEFAULT_HANDLER_TIMEOUT_MS: i64 = 10 * 60 * 1000;
