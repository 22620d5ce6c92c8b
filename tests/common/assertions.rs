//! Custom test assertions for integration tests

use offline_sync::{Event, OfflineManager, TaskId, TaskStatus};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a download to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Download completed and its content is recorded
    Completed,
    /// Download failed and will not be retried automatically
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
}

/// Wait until the task completes or fails terminally
///
/// Polls task snapshots, so it works even when the outcome happened before the call.
pub async fn wait_for_completion(
    manager: &OfflineManager,
    id: TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            if let Some(task) = manager.task(id).await {
                if task.status == TaskStatus::Completed {
                    return WaitResult::Completed;
                }
                if task.is_terminally_failed() {
                    return WaitResult::Failed(task.last_error.unwrap_or_default());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Assert that the manager reports confirmed connectivity within `timeout`
pub async fn go_online(manager: &OfflineManager, timeout: Duration) {
    manager.report_reachability(offline_sync::Reachability::Wifi);
    let deadline = tokio::time::Instant::now() + timeout;
    while !manager.is_online() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "connectivity was never confirmed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
