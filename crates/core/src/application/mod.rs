// Application Layer - Use Cases and Business Logic

pub mod maintenance;
pub mod manager;
pub mod recovery;
pub mod retry;
pub mod worker;

// Re-exports
pub use maintenance::RetentionScheduler;
pub use manager::{EnqueueOptions, JobManager, JobView, QueueStats};
pub use recovery::LivenessSweeper;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool};
