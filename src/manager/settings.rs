//! Storage budget updates.

use crate::config::{SettingsUpdate, StorageBudget};
use crate::db::records;
use crate::error::{Error, Result};

use super::OfflineManager;

impl OfflineManager {
    /// Current storage budget
    pub fn settings(&self) -> StorageBudget {
        self.budget_tx.borrow().clone()
    }

    /// Merge a partial update into the storage budget
    ///
    /// The merged budget is persisted before it is published, so the ledger
    /// and scheduler only ever see settings that survive a restart. Shrinking
    /// the budget does not evict anything by itself; the next admission makes
    /// room.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<StorageBudget> {
        let _guard = self.settings_lock.lock().await;

        let merged = self.settings().merged(&update);
        if merged.max_storage_bytes == 0 {
            return Err(Error::Config {
                message: "max_storage_bytes must be greater than 0".to_string(),
                key: Some("max_storage_bytes".to_string()),
            });
        }

        records::save(self.store.as_ref(), &merged).await?;
        self.budget_tx.send_replace(merged.clone());

        tracing::info!(
            max_storage_bytes = merged.max_storage_bytes,
            retention_days = merged.retention_days,
            wifi_only = merged.wifi_only,
            "Storage settings updated"
        );

        // Lifting wifi_only may make queued work admissible
        self.scheduler.wake();
        Ok(merged)
    }
}
