//! Storage ledger: the durable index of downloaded content
//!
//! The ledger owns every [`ContentRecord`] and enforces the storage budget and
//! retention policy. Budget-changing operations (`record`, `evict`,
//! `sweep_expired`, `touch`) serialize on one ledger-wide mutation lock; reads
//! (`usage_snapshot`, `get`, `list_complete`) go straight to the index and may
//! observe a snapshot that is a moment out of date.

use crate::config::StorageBudget;
use crate::db::KvStore;
use crate::db::records::{self, PersistedRecord};
use crate::types::{ContentId, ContentRecord, Event, EvictionReason, UsageSnapshot};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};

mod eviction;

pub(crate) use eviction::plan_admission;

/// Durable index of locally retained content
pub struct StorageLedger {
    store: Arc<dyn KvStore>,
    budget: watch::Receiver<StorageBudget>,
    event_tx: broadcast::Sender<Event>,
    /// Serializes every budget-changing operation
    mutation_lock: Mutex<()>,
    index: RwLock<HashMap<ContentId, ContentRecord>>,
    /// Targets of active transfers; never evicted under budget pressure
    pinned: RwLock<HashSet<ContentId>>,
}

impl StorageLedger {
    /// Load the ledger from the store
    ///
    /// Incomplete records and complete records whose file has disappeared are
    /// dropped; corrupt entries are dropped by the record loader.
    pub async fn load(
        store: Arc<dyn KvStore>,
        budget: watch::Receiver<StorageBudget>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let loaded: Vec<ContentRecord> = records::load_all(store.as_ref()).await?;
        let mut index = HashMap::with_capacity(loaded.len());

        for record in loaded {
            let file_present = tokio::fs::try_exists(&record.storage_path)
                .await
                .unwrap_or(false);

            if record.is_complete && file_present {
                index.insert(record.id.clone(), record);
                continue;
            }

            tracing::warn!(
                content_id = %record.id,
                is_complete = record.is_complete,
                file_present,
                "Dropping unusable content record"
            );
            if !record.is_complete {
                remove_file_if_present(&record.storage_path).await;
            }
            if let Some(thumb) = &record.thumbnail_path {
                remove_file_if_present(thumb).await;
            }
            records::remove::<ContentRecord>(store.as_ref(), &record.record_key()).await?;
        }

        tracing::info!(items = index.len(), "Storage ledger loaded");

        Ok(Self {
            store,
            budget,
            event_tx,
            mutation_lock: Mutex::new(()),
            index: RwLock::new(index),
            pinned: RwLock::new(HashSet::new()),
        })
    }

    /// Insert or replace a record, evicting least-recently-accessed items if the
    /// budget requires it
    ///
    /// Fails with [`StorageError::BudgetExceeded`](crate::error::StorageError::BudgetExceeded) when the item cannot fit even
    /// after evicting every eligible candidate; in that case nothing is evicted.
    pub async fn record(&self, item: ContentRecord) -> Result<()> {
        if item.is_complete && !tokio::fs::try_exists(&item.storage_path).await? {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "content file for {} missing at {}",
                    item.id,
                    item.storage_path.display()
                ),
            )));
        }

        let _guard = self.mutation_lock.lock().await;
        let budget = self.budget.borrow().clone();

        let plan = {
            let index = self.index.read().await;
            let pinned = self.pinned.read().await;
            plan_admission(index.values(), &pinned, &budget, &item.id, item.byte_size)?
        };

        for victim in &plan {
            tracing::info!(
                content_id = %victim,
                incoming = %item.id,
                "Evicting content under budget pressure"
            );
            self.evict_locked(victim, EvictionReason::BudgetPressure)
                .await?;
        }

        records::save(self.store.as_ref(), &item).await?;

        tracing::debug!(content_id = %item.id, bytes = item.byte_size, "Content recorded");
        let previous = self.index.write().await.insert(item.id.clone(), item.clone());

        // A replaced record may have lived under another file name
        if let Some(previous) = previous {
            if previous.storage_path != item.storage_path {
                remove_file_if_present(&previous.storage_path).await;
            }
            if let Some(thumb) = previous.thumbnail_path
                && item.thumbnail_path.as_ref() != Some(&thumb)
            {
                remove_file_if_present(&thumb).await;
            }
        }
        Ok(())
    }

    /// Check whether `size` bytes could be admitted for `id` right now
    ///
    /// Read-only: the same planning `record` performs, without evicting.
    pub async fn check_admission(&self, id: &ContentId, size: u64) -> Result<()> {
        let budget = self.budget.borrow().clone();
        let index = self.index.read().await;
        let pinned = self.pinned.read().await;
        plan_admission(index.values(), &pinned, &budget, id, size)
            .map(|_| ())
            .map_err(Error::from)
    }

    /// Delete a record and its files; evicting an absent id is a no-op
    ///
    /// Returns whether a record was removed.
    pub async fn evict(&self, id: &ContentId) -> Result<bool> {
        let _guard = self.mutation_lock.lock().await;
        self.evict_locked(id, EvictionReason::Manual).await
    }

    /// Evict every record whose retention window or explicit expiry has passed
    ///
    /// Returns the number of records evicted. A failure on one record is logged
    /// and does not stop the sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.mutation_lock.lock().await;
        let retention = self.budget.borrow().retention();

        let expired: Vec<ContentId> = {
            let index = self.index.read().await;
            let pinned = self.pinned.read().await;
            index
                .values()
                .filter(|r| !pinned.contains(&r.id))
                .filter(|r| {
                    // A retention window past the end of time never expires
                    let retained_until = r.downloaded_at.checked_add_signed(retention);
                    retained_until.is_some_and(|until| until < now)
                        || r.expires_at.is_some_and(|at| at <= now)
                })
                .map(|r| r.id.clone())
                .collect()
        };

        let mut evicted = 0;
        for id in expired {
            match self.evict_locked(&id, EvictionReason::Expired).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(content_id = %id, error = %e, "Failed to evict expired content");
                }
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, "Expired content swept");
        }
        Ok(evicted)
    }

    /// Evict every record
    pub async fn clear_all(&self) -> Result<usize> {
        let _guard = self.mutation_lock.lock().await;
        let ids: Vec<ContentId> = self.index.read().await.keys().cloned().collect();

        let mut evicted = 0;
        for id in ids {
            if self.evict_locked(&id, EvictionReason::Manual).await? {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Point-in-time usage; never waits on the mutation lock
    pub async fn usage_snapshot(&self) -> UsageSnapshot {
        let total_budget = self.budget.borrow().max_storage_bytes;
        let index = self.index.read().await;
        let used: u64 = index.values().map(|r| r.byte_size).sum();

        UsageSnapshot {
            total_budget,
            used,
            available: total_budget.saturating_sub(used),
            item_count: index.len(),
        }
    }

    /// Look up a record without touching its access time
    pub async fn get(&self, id: &ContentId) -> Option<ContentRecord> {
        self.index.read().await.get(id).cloned()
    }

    /// Look up a complete record and mark it as accessed now
    pub async fn touch(&self, id: &ContentId) -> Result<Option<ContentRecord>> {
        let _guard = self.mutation_lock.lock().await;

        let Some(mut record) = self.index.read().await.get(id).cloned() else {
            return Ok(None);
        };
        if !record.is_complete {
            return Ok(None);
        }

        record.last_accessed_at = Utc::now();
        records::save(self.store.as_ref(), &record).await?;
        self.index
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        Ok(Some(record))
    }

    /// Attach a thumbnail to an existing record
    pub(crate) async fn set_thumbnail(&self, id: &ContentId, path: &Path) -> Result<bool> {
        let _guard = self.mutation_lock.lock().await;

        let Some(mut record) = self.index.read().await.get(id).cloned() else {
            return Ok(false);
        };
        record.thumbnail_path = Some(path.to_path_buf());
        records::save(self.store.as_ref(), &record).await?;
        self.index.write().await.insert(record.id.clone(), record);
        Ok(true)
    }

    /// Complete records, most recently downloaded first
    pub async fn list_complete(&self) -> Vec<ContentRecord> {
        let mut items: Vec<ContentRecord> = self
            .index
            .read()
            .await
            .values()
            .filter(|r| r.is_complete)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.downloaded_at
                .cmp(&a.downloaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    /// Protect a record from budget-pressure eviction while its content is being transferred
    pub async fn pin(&self, id: &ContentId) {
        self.pinned.write().await.insert(id.clone());
    }

    /// Release a pin taken with [`pin`](Self::pin)
    pub async fn unpin(&self, id: &ContentId) {
        self.pinned.write().await.remove(id);
    }

    /// Eviction body; caller holds the mutation lock
    async fn evict_locked(&self, id: &ContentId, reason: EvictionReason) -> Result<bool> {
        let Some(record) = self.index.read().await.get(id).cloned() else {
            return Ok(false);
        };

        remove_file(&record.storage_path).await?;
        if let Some(thumb) = &record.thumbnail_path {
            remove_file(thumb).await?;
        }

        records::remove::<ContentRecord>(self.store.as_ref(), &record.record_key()).await?;
        self.index.write().await.remove(id);

        tracing::info!(content_id = %id, ?reason, bytes = record.byte_size, "Content evicted");
        self.event_tx
            .send(Event::ContentEvicted {
                content_id: id.clone(),
                reason,
            })
            .ok();

        Ok(true)
    }
}

/// Remove a file, treating "already gone" as success
async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Best-effort removal for cleanup paths that must not fail
pub(crate) async fn remove_file_if_present(path: &Path) {
    if let Err(e) = remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
