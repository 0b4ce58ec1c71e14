//! Built-in Job Handlers
//!
//! Handlers the daemon registers out of the box: vault file verification,
//! e-mail spooling and temp file cleanup. AI analysis and transcription job
//! types are registered by deployments that embed the respective providers.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use vaultq_core::domain::JobPayload;
use vaultq_core::port::{HandlerError, HandlerResult, JobContext, JobHandler};

const READ_CHUNK_SIZE: usize = 64 * 1024;

fn parse_payload<T: serde::de::DeserializeOwned>(payload: &JobPayload) -> Result<T, HandlerError> {
    serde_json::from_value(payload.as_value().clone())
        .map_err(|e| HandlerError::NonRetryable(format!("Malformed payload: {}", e)))
}

// ============================================================================
// FILE_PROCESSING
// ============================================================================

#[derive(Debug, Deserialize)]
struct FileProcessingPayload {
    path: String,
}

/// Reads a vault file end to end, verifying it is complete and readable.
///
/// Progress tracks the byte offset; the cancellation flag is honored between
/// chunks so gigabyte files do not pin a worker past a cancel request.
pub struct FileProcessingHandler;

#[async_trait]
impl JobHandler for FileProcessingHandler {
    async fn run(&self, payload: &JobPayload, ctx: &JobContext) -> HandlerResult {
        let params: FileProcessingPayload = parse_payload(payload)?;

        if ctx.is_cancel_requested().await {
            return Err(HandlerError::Cancelled);
        }

        let metadata = tokio::fs::metadata(&params.path)
            .await
            .map_err(|e| HandlerError::Failure(format!("stat {} failed: {}", params.path, e)))?;
        if !metadata.is_file() {
            return Err(HandlerError::NonRetryable(format!(
                "{} is not a regular file",
                params.path
            )));
        }
        let total = metadata.len();

        let mut file = tokio::fs::File::open(&params.path)
            .await
            .map_err(|e| HandlerError::Failure(format!("open {} failed: {}", params.path, e)))?;

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut read_bytes: u64 = 0;
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| HandlerError::Failure(format!("read {} failed: {}", params.path, e)))?;
            if n == 0 {
                break;
            }
            read_bytes += n as u64;

            if total > 0 {
                let progress = ((read_bytes * 100) / total).min(100) as u8;
                ctx.report_progress(progress).await;
            }
            if ctx.is_cancel_requested().await {
                return Err(HandlerError::Cancelled);
            }
        }

        debug!(path = %params.path, size_bytes = read_bytes, "File verified");

        Ok(serde_json::json!({
            "path": params.path,
            "size_bytes": read_bytes,
        }))
    }
}

// ============================================================================
// EMAIL_NOTIFICATION
// ============================================================================

#[derive(Debug, Deserialize)]
struct EmailNotificationPayload {
    to: String,
    subject: String,
    #[serde(default)]
    body: String,
}

/// Spools an outgoing notification to the outbox directory
///
/// Actual delivery is handled by the mail relay watching the outbox; the
/// job succeeds once the message is durably spooled.
pub struct EmailNotificationHandler {
    outbox_dir: PathBuf,
}

impl EmailNotificationHandler {
    pub fn new(outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
        }
    }
}

#[async_trait]
impl JobHandler for EmailNotificationHandler {
    async fn run(&self, payload: &JobPayload, ctx: &JobContext) -> HandlerResult {
        let params: EmailNotificationPayload = parse_payload(payload)?;

        if params.to.is_empty() {
            return Err(HandlerError::NonRetryable(
                "Recipient address is empty".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.outbox_dir)
            .await
            .map_err(|e| HandlerError::Failure(format!("create outbox dir failed: {}", e)))?;

        let message = serde_json::json!({
            "to": params.to,
            "subject": params.subject,
            "body": params.body,
            "job_id": ctx.job_id(),
        });
        let spool_path = self.outbox_dir.join(format!("{}.json", ctx.job_id()));
        tokio::fs::write(&spool_path, serde_json::to_vec_pretty(&message).unwrap_or_default())
            .await
            .map_err(|e| HandlerError::Failure(format!("spool write failed: {}", e)))?;

        info!(to = %params.to, spool = %spool_path.display(), "Notification spooled");

        Ok(serde_json::json!({
            "spooled_to": spool_path.display().to_string(),
        }))
    }
}

// ============================================================================
// TEMP_FILE_CLEANUP
// ============================================================================

#[derive(Debug, Deserialize)]
struct TempFileCleanupPayload {
    /// Override the handler-level age threshold (milliseconds)
    #[serde(default)]
    max_age_ms: Option<u64>,
}

/// Deletes temp files older than the age threshold
pub struct TempFileCleanupHandler {
    temp_dir: PathBuf,
    default_max_age_ms: u64,
}

impl TempFileCleanupHandler {
    pub fn new(temp_dir: impl Into<PathBuf>, default_max_age_ms: u64) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            default_max_age_ms,
        }
    }
}

#[async_trait]
impl JobHandler for TempFileCleanupHandler {
    async fn run(&self, payload: &JobPayload, ctx: &JobContext) -> HandlerResult {
        let params: TempFileCleanupPayload = parse_payload(payload)?;
        let max_age =
            std::time::Duration::from_millis(params.max_age_ms.unwrap_or(self.default_max_age_ms));

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.temp_dir)
            .await
            .map_err(|e| HandlerError::Failure(format!("read temp dir failed: {}", e)))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| HandlerError::Failure(format!("read temp dir failed: {}", e)))?
        {
            entries.push(entry);
        }

        let now = std::time::SystemTime::now();
        let total = entries.len();
        let mut deleted = 0u64;

        for (i, entry) in entries.iter().enumerate() {
            if ctx.is_cancel_requested().await {
                return Err(HandlerError::Cancelled);
            }

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let expired = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .map(|age| age >= max_age)
                .unwrap_or(false);

            if expired {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        deleted += 1;
                        debug!(path = %path.display(), "Deleted stale temp file");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to delete temp file")
                    }
                }
            }

            ctx.report_progress((((i + 1) * 100) / total.max(1)) as u8).await;
        }

        info!(scanned = total, deleted = deleted, "Temp file cleanup finished");

        Ok(serde_json::json!({
            "scanned": total,
            "deleted": deleted,
        }))
    }
}
