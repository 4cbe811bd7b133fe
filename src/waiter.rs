//! Readiness polling: waiting for a file ffmpeg has not written yet.

use std::path::Path;
use std::time::Duration;

/// Poll for `path` to exist and be non-empty, up to `timeout`. Returns
/// `true` once the file is ready, `false` if the timeout elapses first.
pub async fn wait_ready(path: &Path, timeout: Duration, interval: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.len() > 0 {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
