//! Retained content access and storage usage.

use crate::error::Result;
use crate::types::{ContentId, ContentRecord, UsageSnapshot};
use chrono::Utc;

use super::OfflineManager;

impl OfflineManager {
    /// Open retained content, marking it as accessed
    ///
    /// Returns `None` when the item is not available offline.
    pub async fn content(&self, id: &ContentId) -> Result<Option<ContentRecord>> {
        self.ledger.touch(id).await
    }

    /// Every completely downloaded item, most recently downloaded first
    pub async fn list_content(&self) -> Vec<ContentRecord> {
        self.ledger.list_complete().await
    }

    /// Whether an item is fully available offline
    pub async fn is_available_offline(&self, id: &ContentId) -> bool {
        self.ledger
            .get(id)
            .await
            .is_some_and(|record| record.is_complete)
    }

    /// Delete an item and its files; returns whether anything was removed
    pub async fn evict(&self, id: &ContentId) -> Result<bool> {
        self.ledger.evict(id).await
    }

    /// Delete every retained item; returns how many were removed
    pub async fn clear_all_content(&self) -> Result<usize> {
        self.ledger.clear_all().await
    }

    /// Remove items past their retention window or expiry
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.ledger.sweep_expired(Utc::now()).await
    }

    /// Current storage usage against the budget
    pub async fn usage_snapshot(&self) -> UsageSnapshot {
        self.ledger.usage_snapshot().await
    }
}
