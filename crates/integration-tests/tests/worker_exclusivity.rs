//! Claim exclusivity and concurrent access against the real store
//!
//! Many workers, many clients, one WAL-mode SQLite file. Every job must be
//! executed exactly once and no enqueue may fail under contention.

use std::sync::Arc;
use std::time::Duration;

use vaultq_core::application::{
    shutdown_channel, EnqueueOptions, JobManager, RetryPolicy, WorkerPool,
};
use vaultq_core::domain::{JobState, JobType, QueueConfig};
use vaultq_core::port::handler::mocks::MockHandler;
use vaultq_core::port::handler::HandlerRegistry;
use vaultq_core::port::id_provider::UuidProvider;
use vaultq_core::port::time_provider::SystemTimeProvider;
use vaultq_core::port::JobRepository;
use vaultq_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};

const QUEUE: &str = "file-processing";

async fn setup() -> (tempfile::TempDir, Arc<SqliteJobRepository>, Arc<JobManager>) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vaultq.db");
    let pool = create_pool(db_path.to_str().unwrap()).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = Arc::new(SqliteJobRepository::new(pool));
    let manager = Arc::new(JobManager::new(
        vec![QueueConfig::new(QUEUE, 4)],
        repo.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ));
    (dir, repo, manager)
}

async fn wait_until_drained(repo: &SqliteJobRepository, expected_completed: i64) {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let completed = repo
                .count_by_state(QUEUE, JobState::Completed)
                .await
                .unwrap();
            if completed >= expected_completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("queue did not drain in time");
}

#[tokio::test]
async fn each_job_executes_exactly_once_across_workers() {
    let (_dir, repo, manager) = setup().await;

    let handler = Arc::new(MockHandler::new_success());
    let mut registry = HandlerRegistry::new();
    registry
        .register(JobType::FileProcessing, handler.clone())
        .unwrap();

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    WorkerPool::spawn(
        QueueConfig::new(QUEUE, 4),
        repo.clone(),
        Arc::new(registry),
        Arc::new(RetryPolicy::new(10, 60_000)),
        Arc::new(SystemTimeProvider),
        shutdown_rx,
    );

    let mut job_ids = Vec::new();
    for i in 0..20 {
        let id = manager
            .enqueue(
                QUEUE,
                JobType::FileProcessing,
                serde_json::json!({"file": i}),
                EnqueueOptions {
                    max_attempts: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        job_ids.push(id);
    }

    wait_until_drained(&repo, 20).await;
    shutdown_tx.shutdown();

    // 20 jobs, 20 invocations: a double claim would inflate the count
    assert_eq!(handler.call_count(), 20);
    for id in &job_ids {
        let job = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 1);
    }
}

#[tokio::test]
async fn single_job_is_claimed_by_exactly_one_worker() {
    let (_dir, repo, manager) = setup().await;

    let handler = Arc::new(MockHandler::new_success());
    let mut registry = HandlerRegistry::new();
    registry
        .register(JobType::FileProcessing, handler.clone())
        .unwrap();

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    WorkerPool::spawn(
        QueueConfig::new(QUEUE, 4),
        repo.clone(),
        Arc::new(registry),
        Arc::new(RetryPolicy::new(10, 60_000)),
        Arc::new(SystemTimeProvider),
        shutdown_rx,
    );

    let job_id = manager
        .enqueue(
            QUEUE,
            JobType::FileProcessing,
            serde_json::json!({}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    wait_until_drained(&repo, 1).await;
    shutdown_tx.shutdown();

    assert_eq!(handler.call_count(), 1);
    let job = repo.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn concurrent_enqueues_all_succeed() {
    let (_dir, repo, manager) = setup().await;

    let mut handles = Vec::new();
    for task in 0..10 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..20 {
                manager
                    .enqueue(
                        QUEUE,
                        JobType::FileProcessing,
                        serde_json::json!({"task": task, "i": i}),
                        EnqueueOptions::default(),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let waiting = repo.count_by_state(QUEUE, JobState::Waiting).await.unwrap();
    assert_eq!(waiting, 200);
}
