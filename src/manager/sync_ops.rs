//! Mutation queueing, drains and connectivity reports.

use crate::error::{Error, Result};
use crate::types::{DrainReport, Reachability, SyncEntry, SyncEntryId};

use super::OfflineManager;

impl OfflineManager {
    /// Queue a mutation for delivery to the remote service
    ///
    /// Succeeds while offline. When online, the sync worker is nudged to
    /// deliver it promptly. Rejected with [`Error::ShuttingDown`] once
    /// shutdown has begun.
    pub async fn append(&self, payload: serde_json::Value) -> Result<SyncEntryId> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let id = self.sync.append(payload).await?;
        if self.gate.is_online() {
            self.background.sync_trigger.notify_one();
        }
        Ok(id)
    }

    /// Deliver pending mutations now
    ///
    /// While offline nothing is attempted and the report only counts what
    /// remains. A drain requested while another is running returns that
    /// drain's report.
    pub async fn drain(&self) -> Result<DrainReport> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        if !self.gate.is_online() {
            let remaining = self.sync.len().await;
            tracing::debug!(remaining, "Offline, drain skipped");
            return Ok(DrainReport {
                remaining,
                ..Default::default()
            });
        }
        self.sync.drain().await
    }

    /// Mutations still awaiting delivery, in delivery order
    pub async fn pending_mutations(&self) -> Vec<SyncEntry> {
        self.sync.entries().await
    }

    /// The application came to the foreground: resume downloads and drain
    pub async fn on_foreground(&self) -> Result<DrainReport> {
        self.scheduler.wake();
        self.drain().await
    }

    /// Feed a reachability report from the platform
    pub fn report_reachability(&self, reachability: Reachability) {
        self.gate.report(reachability);
    }

    /// Confirmed reachability
    pub fn reachability(&self) -> Reachability {
        self.gate.current()
    }

    /// Whether a network is confirmed
    pub fn is_online(&self) -> bool {
        self.gate.is_online()
    }
}
