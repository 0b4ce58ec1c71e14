// Worker constants (no magic values inline)
use std::time::Duration;

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default retry delay cap (5 minutes)
pub const DEFAULT_RETRY_MAX_DELAY_MS: i64 = 5 * 60 * 1000;

/// Liveness window: an ACTIVE job whose heartbeat is older than this is
/// treated as abandoned by a dead worker (5 minutes)
pub const DEFAULT_LIVENESS_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Heartbeat interval while a handler is running (30s)
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Liveness sweep interval (1 minute)
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
