//! Task lifecycle control: pause, resume, cancel, retry, dismiss.

use crate::db::records;
use crate::error::Result;
use crate::types::{ContentId, DownloadTask, Event, TaskId, TaskStatus};

use super::{DownloadScheduler, invalid_state, task_mut};

impl DownloadScheduler {
    /// Pause an active download
    ///
    /// The running transfer is cancelled and its partial file discarded; the
    /// task restarts from zero when resumed. Any state other than `active`,
    /// including `paused`, fails with
    /// [`DownloadError::InvalidState`](crate::error::DownloadError::InvalidState).
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let task = task_mut(&mut tasks, id)?;

        if task.status != TaskStatus::Active {
            return Err(invalid_state(task, "pause"));
        }

        task.status = TaskStatus::Paused;
        task.transferred_bytes = 0;
        let snapshot = task.clone();

        self.detach_active(id, &snapshot.target).await;
        self.persist_and_report(&snapshot).await?;
        drop(tasks);

        tracing::info!(task_id = id.0, "Download paused");
        // The freed slot may admit the next pending task
        self.wake();
        Ok(())
    }

    /// Resume a paused download
    ///
    /// The task returns to `pending` and keeps its place in enqueue order.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let task = task_mut(&mut tasks, id)?;

        if task.status != TaskStatus::Paused {
            return Err(invalid_state(task, "resume"));
        }

        task.status = TaskStatus::Pending;
        let snapshot = task.clone();
        self.persist_and_report(&snapshot).await?;
        drop(tasks);

        tracing::info!(task_id = id.0, "Download resumed");
        self.wake();
        Ok(())
    }

    /// Cancel a download that has not reached a terminal state
    ///
    /// Removes the task. A running transfer is signalled and deletes its
    /// partial file as it exits. Completed and terminally failed tasks are
    /// removed with [`dismiss`](Self::dismiss) instead.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let task = task_mut(&mut tasks, id)?;

        if !task.is_live() {
            return Err(invalid_state(task, "cancel"));
        }
        let target = task.target.clone();

        self.detach_active(id, &target).await;
        self.remove_task(&mut tasks, id).await?;
        drop(tasks);

        tracing::info!(task_id = id.0, content_id = %target, "Download cancelled");
        self.wake();
        Ok(())
    }

    /// Re-queue a terminally failed download
    ///
    /// Typically used after freeing space for a task that failed with
    /// `BudgetExceeded`. The attempt counter starts over.
    pub async fn retry(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let task = task_mut(&mut tasks, id)?;

        if !task.is_terminally_failed() {
            return Err(invalid_state(task, "retry"));
        }

        task.status = TaskStatus::Pending;
        task.attempts = 0;
        task.transferred_bytes = 0;
        task.retry_at = None;
        let snapshot = task.clone();
        self.persist_and_report(&snapshot).await?;
        drop(tasks);

        tracing::info!(task_id = id.0, "Download re-queued for retry");
        self.wake();
        Ok(())
    }

    /// Remove a completed or terminally failed task once its outcome has been consumed
    pub async fn dismiss(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.queue_state.tasks.lock().await;
        let task = task_mut(&mut tasks, id)?;

        if task.is_live() {
            return Err(invalid_state(task, "dismiss"));
        }

        self.remove_task(&mut tasks, id).await?;
        tracing::debug!(task_id = id.0, "Task dismissed");
        Ok(())
    }

    /// Stop tracking a running transfer: signal its token and release the
    /// ledger pin. Caller holds the tasks lock.
    pub(crate) async fn detach_active(&self, id: TaskId, target: &ContentId) {
        let removed = self.queue_state.active_downloads.lock().await.remove(&id);
        if let Some(transfer) = removed {
            transfer.cancel_token.cancel();
            self.ledger.unpin(target).await;
        }
    }

    async fn remove_task(
        &self,
        tasks: &mut std::collections::BTreeMap<TaskId, DownloadTask>,
        id: TaskId,
    ) -> Result<()> {
        records::remove::<DownloadTask>(self.store.as_ref(), &id.key()).await?;
        tasks.remove(&id);
        self.emit_event(Event::Removed { task_id: id });
        Ok(())
    }
}
