//! Shutdown coordination.

use crate::error::Result;
use crate::types::{DownloadTask, TaskStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::DownloadScheduler;

/// How long shutdown waits for running transfers to exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl DownloadScheduler {
    /// Gracefully shut down the scheduler
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads and stops the queue processor
    /// 2. Returns active tasks to `pending` (persisted) and cancels their transfers
    /// 3. Waits for the transfers to exit with a timeout (30 seconds)
    ///
    /// Interrupted tasks restart from zero in the next session.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down download scheduler");

        // 1. Stop accepting new downloads
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.queue_state.shutdown.cancel();

        // 2. Interrupt active transfers
        let interrupted = self.interrupt_active().await?;
        tracing::info!(interrupted, "Signalled active downloads to stop");

        // 3. Wait for every permit to come back
        let permits = u32::try_from(self.config.max_concurrent_downloads).unwrap_or(u32::MAX);
        match tokio::time::timeout(
            SHUTDOWN_TIMEOUT,
            self.queue_state.concurrent_limit.acquire_many(permits),
        )
        .await
        {
            Ok(Ok(_all)) => tracing::info!("All transfers stopped"),
            Ok(Err(_)) => tracing::debug!("Concurrency limiter already closed"),
            Err(_) => {
                tracing::warn!("Timeout waiting for transfers to stop, proceeding with shutdown");
            }
        }
        self.queue_state.concurrent_limit.close();

        Ok(())
    }

    /// Move every active task back to `pending` and cancel its transfer
    async fn interrupt_active(&self) -> Result<usize> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let active: Vec<DownloadTask> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Active)
            .cloned()
            .collect();

        for mut task in active.iter().cloned() {
            self.detach_active(task.id, &task.target).await;
            task.status = TaskStatus::Pending;
            task.transferred_bytes = 0;
            self.persist_and_report(&task).await?;
            tasks.insert(task.id, task);
        }

        Ok(active.len())
    }
}
