//! Queue processor: admits pending tasks into the active set and spawns their transfers.

use crate::error::Result;
use crate::types::{DownloadTask, TaskStatus};
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::download_task::{DownloadTaskContext, run_download_task};
use super::{ActiveTransfer, DownloadScheduler};

/// Interval between queue polling attempts when nothing is admissible
///
/// Also bounds how late a failed task is re-admitted after its `retry_at`.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl DownloadScheduler {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that continuously:
    /// 1. Acquires a permit from the concurrency limiter (respects max_concurrent_downloads)
    /// 2. Checks that the network allows new transfers (online, Wi-Fi when `wifi_only`)
    /// 3. Promotes the oldest pending task to `active` and spawns its transfer
    /// 4. Otherwise releases the permit and sleeps until woken or the poll interval passes
    ///
    /// Failed tasks whose retry time has passed rejoin the pending set on each
    /// pass. The loop exits on shutdown.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let shutdown = scheduler.queue_state.shutdown.clone();
            let concurrent_limit = scheduler.queue_state.concurrent_limit.clone();

            loop {
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    permit = concurrent_limit.clone().acquire_owned() => permit,
                };

                let permit = match permit {
                    Ok(p) => p,
                    // Semaphore closed during shutdown
                    Err(_) => break,
                };

                let next = if scheduler.admission_allowed() {
                    match scheduler.admit_next().await {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to admit next download");
                            None
                        }
                    }
                } else {
                    None
                };

                match next {
                    Some(ctx) => {
                        let driver = scheduler.clone();
                        tokio::spawn(async move {
                            run_download_task(ctx).await;
                            // Release the slot before waking the driver so it can be reused
                            drop(permit);
                            driver.wake();
                        });
                    }
                    None => {
                        drop(permit);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = scheduler.queue_state.wake.notified() => {}
                            _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                        }
                    }
                }
            }

            tracing::debug!("Queue processor stopped");
        })
    }

    /// Promote the oldest pending task to `active`
    ///
    /// The caller must hold a concurrency permit for the returned task.
    pub(super) async fn admit_next(&self) -> Result<Option<DownloadTaskContext>> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut tasks = self.queue_state.tasks.lock().await;
        let now = Utc::now();

        let due: Vec<DownloadTask> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed && t.retry_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        for mut task in due {
            task.status = TaskStatus::Pending;
            task.retry_at = None;
            self.persist_and_report(&task).await?;
            tracing::debug!(task_id = task.id.0, attempts = task.attempts, "Retry due");
            tasks.insert(task.id, task);
        }

        let Some(mut task) = tasks
            .values()
            .find(|t| t.status == TaskStatus::Pending)
            .cloned()
        else {
            return Ok(None);
        };

        task.status = TaskStatus::Active;
        task.transferred_bytes = 0;
        self.persist_and_report(&task).await?;

        let generation = self
            .queue_state
            .next_generation
            .fetch_add(1, Ordering::SeqCst);
        let cancel_token = CancellationToken::new();
        self.queue_state.active_downloads.lock().await.insert(
            task.id,
            ActiveTransfer {
                generation,
                cancel_token: cancel_token.clone(),
            },
        );
        self.ledger.pin(&task.target).await;

        tracing::info!(
            task_id = task.id.0,
            content_id = %task.target,
            attempt = task.attempts + 1,
            "Download admitted"
        );

        let ctx = DownloadTaskContext {
            id: task.id,
            generation,
            target: task.target.clone(),
            cancel_token,
            scheduler: self.clone(),
        };
        tasks.insert(task.id, task);

        Ok(Some(ctx))
    }
}
