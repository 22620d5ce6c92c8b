//! Download scheduler split into focused submodules.
//!
//! The [`DownloadScheduler`] struct and its methods are organized by domain:
//! - [`queue`] - Enqueue with deduplication, restore after restart
//! - [`control`] - Task lifecycle control (pause/resume/cancel/retry/dismiss)
//! - [`queue_processor`] - Driver loop admitting pending tasks under the concurrency bound
//! - [`download_task`] - Byte transfer of one task and its completion
//! - [`lifecycle`] - Graceful shutdown

mod control;
mod download_task;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::catalog::CatalogAdapter;
use crate::config::{DownloadConfig, StorageBudget};
use crate::db::KvStore;
use crate::db::records;
use crate::error::{DownloadError, Error, Result};
use crate::ledger::StorageLedger;
use crate::types::{DownloadTask, Event, Reachability, TaskId, TaskStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify, Semaphore, broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Cancellation handle for one running transfer
///
/// The generation distinguishes successive runs of the same task, so a run
/// that was paused and superseded can never update the task it used to own.
#[derive(Clone, Debug)]
pub(crate) struct ActiveTransfer {
    pub(crate) generation: u64,
    pub(crate) cancel_token: CancellationToken,
}

/// Queue and transfer state
///
/// Lock order: `tasks` before `active_downloads`.
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Every known task, keyed (and therefore ordered) by enqueue order
    pub(crate) tasks: Arc<Mutex<BTreeMap<TaskId, DownloadTask>>>,
    /// Running transfers and their cancellation tokens
    pub(crate) active_downloads: Arc<Mutex<HashMap<TaskId, ActiveTransfer>>>,
    /// One permit per allowed concurrent transfer
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Next task id to hand out
    pub(crate) next_id: Arc<AtomicU64>,
    /// Next transfer generation
    pub(crate) next_generation: Arc<AtomicU64>,
    /// Wakes the driver when admission may have become possible
    pub(crate) wake: Arc<Notify>,
    /// Stops the driver loop
    pub(crate) shutdown: CancellationToken,
}

/// Durable download queue with bounded concurrent transfers (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadScheduler {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) catalog: Arc<dyn CatalogAdapter>,
    pub(crate) ledger: Arc<StorageLedger>,
    pub(crate) config: Arc<DownloadConfig>,
    pub(crate) budget: watch::Receiver<StorageBudget>,
    pub(crate) reachability: watch::Receiver<Reachability>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) queue_state: QueueState,
}

impl DownloadScheduler {
    /// Create a scheduler and restore persisted tasks
    ///
    /// Tasks persisted as `active` come back as `pending`: an interrupted
    /// transfer cannot be assumed valid.
    pub async fn load(
        store: Arc<dyn KvStore>,
        catalog: Arc<dyn CatalogAdapter>,
        ledger: Arc<StorageLedger>,
        config: DownloadConfig,
        budget: watch::Receiver<StorageBudget>,
        reachability: watch::Receiver<Reachability>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create storage directory '{}': {}",
                        config.storage_dir.display(),
                        e
                    ),
                ))
            })?;

        let queue_state = QueueState {
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            concurrent_limit: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
            next_generation: Arc::new(AtomicU64::new(1)),
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        };

        let scheduler = Self {
            store,
            catalog,
            ledger,
            config: Arc::new(config),
            budget,
            reachability,
            event_tx,
            queue_state,
        };

        scheduler.restore_queue().await?;

        Ok(scheduler)
    }

    /// Snapshot of every task in enqueue order
    pub async fn tasks(&self) -> Vec<DownloadTask> {
        self.queue_state.tasks.lock().await.values().cloned().collect()
    }

    /// Snapshot of one task
    pub async fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.queue_state.tasks.lock().await.get(&id).cloned()
    }

    /// Number of tasks currently `active`
    pub async fn active_count(&self) -> usize {
        self.queue_state
            .tasks
            .lock()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Active)
            .count()
    }

    /// Ask the driver to look for admissible work now
    pub fn wake(&self) {
        self.queue_state.wake.notify_one();
    }

    /// Whether new transfers may start on the current network
    pub(crate) fn admission_allowed(&self) -> bool {
        let reachability = *self.reachability.borrow();
        if self.budget.borrow().wifi_only {
            reachability == Reachability::Wifi
        } else {
            reachability.is_online()
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Persist a task and report its progress
    pub(crate) async fn persist_and_report(&self, task: &DownloadTask) -> Result<()> {
        records::save(self.store.as_ref(), task).await?;
        self.emit_event(Event::Progress(task.progress()));
        Ok(())
    }
}

/// Look up a task or fail with [`DownloadError::NotFound`]
pub(crate) fn task_mut(
    tasks: &mut BTreeMap<TaskId, DownloadTask>,
    id: TaskId,
) -> Result<&mut DownloadTask> {
    tasks
        .get_mut(&id)
        .ok_or(Error::Download(DownloadError::NotFound { id }))
}

/// Build an [`DownloadError::InvalidState`] for `operation` on `task`
pub(crate) fn invalid_state(task: &DownloadTask, operation: &str) -> Error {
    Error::Download(DownloadError::InvalidState {
        id: task.id,
        operation: operation.to_string(),
        current_state: task.status.to_string(),
    })
}

pub(crate) fn next_id(state: &QueueState) -> TaskId {
    TaskId(state.next_id.fetch_add(1, Ordering::SeqCst))
}
