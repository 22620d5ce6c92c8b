//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::time::Duration;

use super::OfflineManager;

/// How long shutdown waits for the background loops after the scheduler stopped
const BACKGROUND_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl OfflineManager {
    /// Gracefully shut down the manager
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops the background loops and rejects new work
    /// 2. Shuts down the download scheduler (active tasks return to `pending`)
    /// 3. Waits for the background loops to exit with a timeout (10 seconds)
    /// 4. Marks a clean shutdown in the store
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// Returns an error if persisting task state fails during the scheduler
    /// shutdown. Later steps still run.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop background loops and new mutations
        self.background.shutdown.cancel();

        // 2. Stop downloads
        let scheduler_result = self.scheduler.shutdown().await;
        if let Err(e) = &scheduler_result {
            tracing::error!(error = %e, "Download scheduler shutdown failed");
        }

        // 3. Wait for loops; a drain in flight finishes its current entry first
        let handles: Vec<_> = self.background.handles.lock().await.drain(..).collect();
        if tokio::time::timeout(BACKGROUND_STOP_TIMEOUT, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!("Timeout waiting for background loops, proceeding with shutdown");
        }

        // 4. Mark clean shutdown
        if let Err(e) = self.store.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown");
        } else {
            tracing::info!("Marked clean shutdown");
        }

        // 5. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        scheduler_result
    }

    /// Whether [`shutdown`](Self::shutdown) has begun
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.background.shutdown.is_cancelled()
    }
}
