//! Sync queue: durable, ordered queue of local mutations awaiting delivery
//!
//! Appending always succeeds locally, whatever the connectivity. A drain pass
//! delivers entries one at a time in enqueue order; see [`drain`](SyncQueue::drain)
//! for the failure policy.

mod drain;


use crate::catalog::CatalogAdapter;
use crate::config::SyncConfig;
use crate::db::KvStore;
use crate::db::records;
use crate::types::{DrainReport, Event, SyncEntry, SyncEntryId};
use crate::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast, watch};

/// Durable FIFO of pending mutations
pub struct SyncQueue {
    store: Arc<dyn KvStore>,
    catalog: Arc<dyn CatalogAdapter>,
    config: SyncConfig,
    event_tx: broadcast::Sender<Event>,
    /// Pending entries keyed (and therefore ordered) by enqueue order
    entries: Mutex<BTreeMap<SyncEntryId, SyncEntry>>,
    next_id: AtomicU64,
    /// Result slot of the pass in progress; later callers wait on it
    in_flight: Mutex<Option<watch::Receiver<Option<DrainReport>>>>,
}

impl SyncQueue {
    /// Load pending entries from the store
    pub async fn load(
        store: Arc<dyn KvStore>,
        catalog: Arc<dyn CatalogAdapter>,
        config: SyncConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let loaded: Vec<SyncEntry> = records::load_all(store.as_ref()).await?;
        let next_id = loaded.iter().map(|e| e.id.0).max().unwrap_or(0) + 1;
        let entries: BTreeMap<_, _> = loaded.into_iter().map(|e| (e.id, e)).collect();

        tracing::info!(pending = entries.len(), "Sync queue loaded");

        Ok(Self {
            store,
            catalog,
            config,
            event_tx,
            entries: Mutex::new(entries),
            next_id: AtomicU64::new(next_id),
            in_flight: Mutex::new(None),
        })
    }

    /// Queue a mutation for delivery
    ///
    /// The entry is durable once this returns; delivery happens on a later drain.
    pub async fn append(&self, payload: serde_json::Value) -> Result<SyncEntryId> {
        // Held across the write so store keys are assigned in id order
        let mut entries = self.entries.lock().await;
        let id = SyncEntryId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let entry = SyncEntry {
            id,
            payload,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
        };
        records::save(self.store.as_ref(), &entry).await?;
        entries.insert(id, entry);

        tracing::debug!(entry_id = id.0, pending = entries.len(), "Mutation queued");
        Ok(id)
    }

    /// Snapshot of pending entries in delivery order
    pub async fn entries(&self) -> Vec<SyncEntry> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Number of pending entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is waiting for delivery
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
