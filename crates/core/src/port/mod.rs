// Port Layer - Interfaces for external dependencies

pub mod handler;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod maintenance;
pub mod time_provider;

// Re-exports
pub use handler::{HandlerError, HandlerRegistry, HandlerResult, JobContext, JobHandler};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use time_provider::TimeProvider;
