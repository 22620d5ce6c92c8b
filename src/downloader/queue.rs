//! Queue management: enqueue with deduplication and restore after restart.

use crate::db::records;
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, DownloadTask, Event, TaskId, TaskStatus};
use chrono::Utc;
use std::sync::atomic::Ordering;

use super::{DownloadScheduler, next_id};

impl DownloadScheduler {
    /// Add a download request to the queue
    ///
    /// If a live task (pending, active, paused or awaiting retry) already
    /// targets the same content, its id is returned and nothing is queued.
    ///
    /// When the request carries `expected_bytes`, the storage budget is checked
    /// up front and a request that cannot fit fails with
    /// [`StorageError::BudgetExceeded`](crate::error::StorageError::BudgetExceeded)
    /// without creating a task.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut tasks = self.queue_state.tasks.lock().await;

        if let Some(existing) = tasks
            .values()
            .find(|t| t.target == request.content && t.is_live())
        {
            tracing::debug!(
                task_id = existing.id.0,
                content_id = %request.content,
                "Content already queued, returning existing task"
            );
            return Ok(existing.id);
        }

        if let Some(expected) = request.expected_bytes {
            self.ledger
                .check_admission(&request.content, expected)
                .await?;
        }

        let id = next_id(&self.queue_state);
        let task = DownloadTask {
            id,
            title: request
                .title
                .unwrap_or_else(|| request.content.to_string()),
            target: request.content,
            total_bytes: request.expected_bytes.unwrap_or(0),
            transferred_bytes: 0,
            status: TaskStatus::Pending,
            last_error: None,
            last_error_code: None,
            attempts: 0,
            retry_at: None,
            created_at: Utc::now(),
        };

        records::save(self.store.as_ref(), &task).await?;
        tasks.insert(id, task.clone());
        drop(tasks);

        tracing::info!(task_id = id.0, content_id = %task.target, "Download queued");
        self.emit_event(Event::Queued {
            task_id: id,
            content_id: task.target.clone(),
        });
        self.emit_event(Event::Progress(task.progress()));
        self.wake();

        Ok(id)
    }

    /// Restore persisted tasks into memory
    ///
    /// Tasks that were `active` when the previous session ended go back to
    /// `pending` with their progress reset. If the ledger already holds a
    /// record for such a task's target written after the task was created,
    /// the transfer had finished and only the status update was lost, so the
    /// task is marked completed instead.
    pub(super) async fn restore_queue(&self) -> Result<()> {
        let persisted: Vec<DownloadTask> = records::load_all(self.store.as_ref()).await?;
        let mut tasks = self.queue_state.tasks.lock().await;
        let mut max_id = 0;
        let mut restarted = 0usize;

        for mut task in persisted {
            max_id = max_id.max(task.id.0);

            if task.status == TaskStatus::Active {
                match self.ledger.get(&task.target).await {
                    Some(record) if record.is_complete && record.downloaded_at >= task.created_at => {
                        task.status = TaskStatus::Completed;
                        task.total_bytes = record.byte_size;
                        task.transferred_bytes = record.byte_size;
                        tracing::info!(
                            task_id = task.id.0,
                            content_id = %task.target,
                            "Interrupted task had already completed"
                        );
                    }
                    _ => {
                        task.status = TaskStatus::Pending;
                        task.transferred_bytes = 0;
                        restarted += 1;
                    }
                }
                records::save(self.store.as_ref(), &task).await?;
            }

            tasks.insert(task.id, task);
        }

        self.queue_state.next_id.store(max_id + 1, Ordering::SeqCst);

        tracing::info!(
            tasks = tasks.len(),
            restarted,
            "Download queue restored"
        );
        Ok(())
    }
}
