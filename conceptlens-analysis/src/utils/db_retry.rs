//! Database retry logic
//!
//! Concurrent analysis workers write to the same SQLite file. Writes that hit
//! `SQLITE_BUSY` / `SQLITE_LOCKED` beyond the pool's busy timeout are retried
//! with exponential backoff until `max_wait_ms` elapses.

use conceptlens_common::{Error, Result};
use std::time::{Duration, Instant};

/// Default retry budget for analysis writes
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// True for transient lock contention errors
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            matches!(db_err.code().as_deref(), Some("5") | Some("6"))
                || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

/// Retry `operation` while it fails with a lock error
///
/// Backoff starts at 10ms and doubles up to 1000ms. Non-lock errors are
/// returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !is_lock_error(&err) => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        error = %err,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
