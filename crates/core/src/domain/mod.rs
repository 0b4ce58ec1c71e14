// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{FailureKind, Job, JobId, JobPayload, JobState, JobType, Priority};
pub use queue::{QueueConfig, QueueId};
