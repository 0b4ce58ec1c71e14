//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelRequest, CancelResponse, EnqueueRequest, EnqueueResponse, MaintenanceRequest,
    MaintenanceResponse, StatsRequest, StatsResponse, StatusRequest, StatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use vaultq_core::application::{EnqueueOptions, JobManager};
use vaultq_core::domain::JobType;
use vaultq_core::error::AppError;
use vaultq_core::port::{Maintenance, MaintenanceConfig};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    manager: Arc<JobManager>,
    maintenance: Arc<dyn Maintenance>,
    maintenance_config: MaintenanceConfig,
    rate_limiter: RateLimiter,
}

impl RpcHandler {
    pub fn new(
        manager: Arc<JobManager>,
        maintenance: Arc<dyn Maintenance>,
        maintenance_config: MaintenanceConfig,
    ) -> Self {
        // Default: 200 burst, 100 req/sec (configurable via env)
        let max_burst: u32 = std::env::var("VAULTQ_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("VAULTQ_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            manager,
            maintenance,
            maintenance_config,
            rate_limiter: RateLimiter::new(max_burst, rate_per_sec),
        }
    }

    /// job.enqueue.v1
    pub async fn enqueue(
        &self,
        params: EnqueueRequest,
    ) -> Result<EnqueueResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check() {
            return Err(throttled());
        }

        let job_type = JobType::parse(&params.job_type)
            .ok_or_else(|| to_rpc_error(AppError::UnknownJobType(params.job_type.clone())))?;

        let job_id = self
            .manager
            .enqueue(
                &params.queue,
                job_type,
                params.payload,
                EnqueueOptions {
                    delay_ms: params.delay_ms,
                    max_attempts: params.max_attempts,
                    priority: params.priority,
                },
            )
            .await
            .map_err(to_rpc_error)?;

        let view = self
            .manager
            .status(&params.queue, &job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(EnqueueResponse {
            job_id,
            queue: params.queue,
            state: view.state.to_string(),
        })
    }

    /// job.status.v1
    pub async fn status(&self, params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let job = self
            .manager
            .status(&params.queue, &params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatusResponse { job })
    }

    /// job.cancel.v1
    pub async fn cancel(&self, params: CancelRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check() {
            return Err(throttled());
        }

        self.manager
            .cancel(&params.queue, &params.job_id)
            .await
            .map_err(to_rpc_error)?;

        // Re-read to tell the caller whether the cancel was immediate
        // (CANCELLED) or advisory (still ACTIVE).
        let view = self
            .manager
            .status(&params.queue, &params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: params.job_id,
            state: view.state.to_string(),
        })
    }

    /// queue.stats.v1
    pub async fn stats(&self, params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self
            .manager
            .queue_stats(&params.queue)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatsResponse {
            queue: params.queue,
            stats,
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceRequest,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        let vacuum_run = if params.force_vacuum
            || stats_before.db_size_mb > self.maintenance_config.max_db_size_mb
        {
            self.maintenance.vacuum().await.map_err(to_rpc_error)?;
            true
        } else {
            false
        };

        let jobs_deleted = self
            .maintenance
            .gc_terminal_jobs(self.maintenance_config.terminal_retention_days)
            .await
            .map_err(to_rpc_error)?;

        let stats_after = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(MaintenanceResponse {
            vacuum_run,
            jobs_deleted,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: stats_after.db_size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use async_trait::async_trait;
    use vaultq_core::domain::{JobState, QueueConfig};
    use vaultq_core::error::Result;
    use vaultq_core::port::id_provider::UuidProvider;
    use vaultq_core::port::job_repository::mocks::InMemoryJobRepository;
    use vaultq_core::port::time_provider::SystemTimeProvider;
    use vaultq_core::port::MaintenanceStats;

    struct NoopMaintenance;

    #[async_trait]
    impl Maintenance for NoopMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            Ok(0.0)
        }

        async fn gc_terminal_jobs(&self, _retention_days: i64) -> Result<i64> {
            Ok(0)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats {
                db_size_mb: 0.1,
                db_size_bytes: 100_000,
                job_count: 0,
                terminal_job_count: 0,
            })
        }
    }

    fn handler() -> RpcHandler {
        let manager = Arc::new(JobManager::new(
            vec![QueueConfig::new("file-processing", 2)],
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        ));
        RpcHandler::new(manager, Arc::new(NoopMaintenance), MaintenanceConfig::default())
    }

    #[tokio::test]
    async fn enqueue_then_status_round_trip() {
        let handler = handler();

        let resp = handler
            .enqueue(EnqueueRequest {
                queue: "file-processing".to_string(),
                job_type: "FILE_PROCESSING".to_string(),
                payload: serde_json::json!({"file": "/vault/a.pdf"}),
                delay_ms: 0,
                max_attempts: 3,
                priority: 0,
            })
            .await
            .unwrap();
        assert_eq!(resp.state, "WAITING");

        let status = handler
            .status(StatusRequest {
                queue: "file-processing".to_string(),
                job_id: resp.job_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(status.job.state, JobState::Waiting);
        assert_eq!(status.job.progress, 0);
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_job_type() {
        let handler = handler();

        let err = handler
            .enqueue(EnqueueRequest {
                queue: "file-processing".to_string(),
                job_type: "MINE_BITCOIN".to_string(),
                payload: serde_json::json!({}),
                delay_ms: 0,
                max_attempts: 3,
                priority: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn cancel_pending_job_reports_cancelled() {
        let handler = handler();

        let resp = handler
            .enqueue(EnqueueRequest {
                queue: "file-processing".to_string(),
                job_type: "FILE_PROCESSING".to_string(),
                payload: serde_json::json!({}),
                delay_ms: 0,
                max_attempts: 3,
                priority: 0,
            })
            .await
            .unwrap();

        let cancel = handler
            .cancel(CancelRequest {
                queue: "file-processing".to_string(),
                job_id: resp.job_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(cancel.state, "CANCELLED");

        // Second cancel conflicts: the job is terminal
        let err = handler
            .cancel(CancelRequest {
                queue: "file-processing".to_string(),
                job_id: resp.job_id,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::CONFLICT);
    }

    #[tokio::test]
    async fn stats_for_unknown_queue_is_validation_error() {
        let handler = handler();

        let err = handler
            .stats(StatsRequest {
                queue: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn maintenance_reports_sizes() {
        let handler = handler();

        let resp = handler
            .maintenance(MaintenanceRequest { force_vacuum: true })
            .await
            .unwrap();
        assert!(resp.vacuum_run);
        assert_eq!(resp.jobs_deleted, 0);
        assert_eq!(resp.db_size_before, 100_000);
    }
}
