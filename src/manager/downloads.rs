//! Download operations: enqueue, hierarchical download and task control.

use crate::error::Result;
use crate::retry::with_retry;
use crate::types::{ContentId, DownloadRequest, DownloadTask, TaskId};
use std::collections::HashSet;

use super::OfflineManager;

impl OfflineManager {
    /// Queue one content item for download
    ///
    /// Requesting content that already has a pending, active or retrying task
    /// returns that task's id. With `expected_bytes` set, content that cannot
    /// fit the storage budget is rejected up front.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<TaskId> {
        self.scheduler.enqueue(request).await
    }

    /// Queue an item and every descendant listed in its descriptor
    ///
    /// A course brings its lessons, a lesson its videos and documents. Each
    /// item is enqueued with the title and size from its descriptor. Returns
    /// the task ids in visiting order (parents before children). If a
    /// descriptor cannot be fetched or an item is rejected, the error is
    /// returned and tasks queued so far stay queued.
    pub async fn download_tree(&self, request: DownloadRequest) -> Result<Vec<TaskId>> {
        let mut task_ids = Vec::new();
        let mut seen: HashSet<ContentId> = HashSet::new();
        // Explicit stack; children pushed in reverse so they are visited in listed order
        let mut stack = vec![request];

        while let Some(request) = stack.pop() {
            if !seen.insert(request.content.clone()) {
                continue;
            }

            let descriptor = with_retry(&self.config.download.retry, || {
                self.catalog.fetch_content_descriptor(&request.content)
            })
            .await?;

            let mut item = request.with_title(descriptor.title.clone());
            if descriptor.byte_size > 0 {
                item = item.with_expected_bytes(descriptor.byte_size);
            }
            task_ids.push(self.scheduler.enqueue(item).await?);

            tracing::debug!(
                content_id = %descriptor.id,
                children = descriptor.children.len(),
                "Expanding download tree"
            );
            for child in descriptor.children.into_iter().rev() {
                stack.push(DownloadRequest::new(child));
            }
        }

        Ok(task_ids)
    }

    /// Pause an active task, stopping its transfer
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(manager: offline_sync::OfflineManager, id: offline_sync::TaskId) -> offline_sync::Result<()> {
    /// manager.pause(id).await?;
    /// manager.resume(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        self.scheduler.pause(id).await
    }

    /// Return a paused task to the queue
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        self.scheduler.resume(id).await
    }

    /// Cancel a live task and discard its partial data
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        self.scheduler.cancel(id).await
    }

    /// Queue a terminally failed task again with a fresh attempt count
    pub async fn retry(&self, id: TaskId) -> Result<()> {
        self.scheduler.retry(id).await
    }

    /// Remove a completed or terminally failed task from the task list
    pub async fn dismiss(&self, id: TaskId) -> Result<()> {
        self.scheduler.dismiss(id).await
    }

    /// Snapshot of every task in enqueue order
    pub async fn tasks(&self) -> Vec<DownloadTask> {
        self.scheduler.tasks().await
    }

    /// Snapshot of one task
    pub async fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.scheduler.task(id).await
    }
}
