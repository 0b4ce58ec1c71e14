//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};
use vaultq_core::application::{JobView, QueueStats};

/// job.enqueue.v1 - Enqueue a job
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub delay_ms: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default)]
    pub priority: i32,
}

fn default_max_attempts() -> i32 {
    3
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub queue: String,
    pub state: String,
}

/// job.status.v1 - Get job status
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub queue: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub job: JobView,
}

/// job.cancel.v1 - Cancel a job
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub queue: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    /// Final state after the cancel request (CANCELLED for pending jobs,
    /// ACTIVE for in-flight jobs that only got the advisory flag)
    pub state: String,
}

/// queue.stats.v1 - Per-queue job counts
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    pub queue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub queue: String,
    #[serde(flatten)]
    pub stats: QueueStats,
}

/// admin.maintenance.v1 - Run manual maintenance
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    #[serde(default)]
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub vacuum_run: bool,
    pub jobs_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
