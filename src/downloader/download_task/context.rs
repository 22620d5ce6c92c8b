//! Download task context: per-run state and guarded task updates.
//!
//! A run only updates its task while it still owns the task's entry in the
//! active set. Pause, cancel and shutdown remove that entry under the tasks
//! lock, after which every update from the superseded run is ignored.

use crate::catalog::ContentDescriptor;
use crate::error::Error;
use crate::retry::{IsRetryable, backoff_delay};
use crate::types::{ContentId, Event, TaskId, TaskStatus};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::super::DownloadScheduler;

/// Shared context for a single run of a download task
pub(crate) struct DownloadTaskContext {
    pub(crate) id: TaskId,
    pub(crate) generation: u64,
    pub(crate) target: ContentId,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) scheduler: DownloadScheduler,
}

impl DownloadTaskContext {
    /// Whether this run still owns its task. Caller holds the tasks lock.
    pub(super) async fn owns_task(&self) -> bool {
        self.scheduler
            .queue_state
            .active_downloads
            .lock()
            .await
            .get(&self.id)
            .is_some_and(|t| t.generation == self.generation)
    }

    /// Copy title and declared size from the descriptor into the task
    pub(super) async fn apply_descriptor(&self, descriptor: &ContentDescriptor) {
        let mut tasks = self.scheduler.queue_state.tasks.lock().await;
        if !self.owns_task().await {
            return;
        }
        let Some(task) = tasks.get_mut(&self.id) else {
            return;
        };

        if !descriptor.title.is_empty() {
            task.title = descriptor.title.clone();
        }
        task.total_bytes = descriptor.byte_size;
        let snapshot = task.clone();
        drop(tasks);

        if let Err(e) = self.scheduler.persist_and_report(&snapshot).await {
            tracing::warn!(task_id = self.id.0, error = %e, "Failed to persist task details");
        }
    }

    /// Record transferred bytes and notify subscribers
    ///
    /// Progress is kept in memory only; a restarted task begins from zero.
    /// Returns false once the run no longer owns its task.
    pub(super) async fn report_progress(&self, transferred: u64) -> bool {
        let mut tasks = self.scheduler.queue_state.tasks.lock().await;
        if !self.owns_task().await {
            return false;
        }
        let Some(task) = tasks.get_mut(&self.id) else {
            return false;
        };

        task.transferred_bytes = transferred;
        self.scheduler.emit_event(Event::Progress(task.progress()));
        true
    }

    /// Mark the task as failed and schedule a retry if the error allows one
    ///
    /// Retryable errors are retried until the attempt count exceeds the
    /// configured maximum; everything else, budget errors included, fails
    /// terminally and waits for the application.
    pub(super) async fn mark_failed(&self, error: &Error) {
        let mut tasks = self.scheduler.queue_state.tasks.lock().await;
        if !self.owns_task().await {
            return;
        }
        let Some(task) = tasks.get_mut(&self.id) else {
            return;
        };

        let policy = &self.scheduler.config.retry;
        task.attempts += 1;
        task.status = TaskStatus::Failed;
        task.transferred_bytes = 0;
        task.last_error = Some(error.to_string());
        task.last_error_code = Some(error.error_code().to_string());
        task.retry_at = if error.is_retryable() && task.attempts <= policy.max_attempts {
            let delay = chrono::Duration::from_std(backoff_delay(policy, task.attempts))
                .unwrap_or_else(|_| chrono::Duration::zero());
            Some(Utc::now() + delay)
        } else {
            None
        };
        let snapshot = task.clone();

        self.scheduler.detach_active(self.id, &self.target).await;
        if let Err(e) = self.scheduler.persist_and_report(&snapshot).await {
            tracing::error!(task_id = self.id.0, error = %e, "Failed to persist task failure");
        }
        drop(tasks);

        let terminal = snapshot.retry_at.is_none();
        if terminal {
            tracing::error!(
                task_id = self.id.0,
                content_id = %self.target,
                attempts = snapshot.attempts,
                error = %error,
                "Download failed"
            );
        } else {
            tracing::warn!(
                task_id = self.id.0,
                content_id = %self.target,
                attempt = snapshot.attempts,
                error = %error,
                "Download attempt failed, retry scheduled"
            );
        }

        self.scheduler.emit_event(Event::TaskFailed {
            task_id: self.id,
            error: error.to_string(),
            error_code: error.error_code().to_string(),
            terminal,
        });
    }
}
