// Vaultq Infrastructure - SQLite Adapter
// Implements: JobRepository, Maintenance

mod connection;
mod job_repository;
mod maintenance_impl;
mod migration;

pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
