//! Offline manager facade split into focused submodules.
//!
//! The [`OfflineManager`] struct and its methods are organized by domain:
//! - [`downloads`] - Enqueue, hierarchical download, task control and snapshots
//! - [`content`] - Access to retained content and storage usage
//! - [`sync_ops`] - Mutation queueing, drains and connectivity reports
//! - [`settings`] - Storage budget updates
//! - [`background`] - Driver, connectivity reaction and sync worker loops
//! - [`lifecycle`] - Graceful shutdown

mod background;
mod content;
mod downloads;
mod lifecycle;
mod settings;
mod sync_ops;


use crate::catalog::CatalogAdapter;
use crate::config::{Config, StorageBudget};
use crate::connectivity::ConnectivityGate;
use crate::db::records::{self, SETTINGS_KEY};
use crate::db::{Database, KvStore};
use crate::downloader::DownloadScheduler;
use crate::error::Result;
use crate::ledger::StorageLedger;
use crate::sync::SyncQueue;
use crate::types::{Event, Reachability, TaskProgress};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Background loops started by [`OfflineManager::start`]
#[derive(Clone, Default)]
pub(crate) struct Background {
    /// Cancelled on shutdown
    pub(crate) shutdown: CancellationToken,
    /// Wakes the sync worker for an immediate drain
    pub(crate) sync_trigger: Arc<Notify>,
    /// Join handles of the spawned loops
    pub(crate) handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// Entry point for offline content and mutation sync
///
/// Cloning is cheap: every component is shared behind an `Arc`.
#[derive(Clone)]
pub struct OfflineManager {
    /// Durable key-value store shared by every component
    pub(crate) store: Arc<dyn KvStore>,
    /// Remote content and sync endpoint
    pub(crate) catalog: Arc<dyn CatalogAdapter>,
    /// Configuration (storage budget lives in `budget_tx`)
    pub(crate) config: Arc<Config>,
    /// Index of retained content
    pub(crate) ledger: Arc<StorageLedger>,
    /// Download tasks and the driver loop
    pub(crate) scheduler: DownloadScheduler,
    /// Pending mutations
    pub(crate) sync: Arc<SyncQueue>,
    /// Debounced reachability
    pub(crate) gate: ConnectivityGate,
    /// Current storage budget; the ledger and scheduler hold receivers
    pub(crate) budget_tx: Arc<watch::Sender<StorageBudget>>,
    /// Serializes settings updates
    pub(crate) settings_lock: Arc<Mutex<()>>,
    /// Event channel for broadcasting events to subscribers
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) background: Background,
}

impl OfflineManager {
    /// Open the SQLite database named in the config and build a manager on it
    ///
    /// # Example
    ///
    /// ```no_run
    /// use offline_sync::{Config, HttpCatalog, OfflineManager};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> offline_sync::Result<()> {
    /// let catalog = Arc::new(HttpCatalog::new("https://learn.example.com/api/")?);
    /// let manager = OfflineManager::new(Config::default(), catalog).await?;
    /// manager.start().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: Config, catalog: Arc<dyn CatalogAdapter>) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_store(config, catalog, Arc::new(db)).await
    }

    /// Build a manager over an existing store
    ///
    /// Startup order: settings, ledger, download tasks, sync queue, then an
    /// expiry sweep. Background loops are not running until [`start`](Self::start).
    pub async fn with_store(
        config: Config,
        catalog: Arc<dyn CatalogAdapter>,
        store: Arc<dyn KvStore>,
    ) -> Result<Self> {
        config.validate()?;

        if store.was_unclean_shutdown().await? {
            tracing::warn!("Previous session did not shut down cleanly");
        }
        store.set_clean_start().await?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let budget = match records::load_one::<StorageBudget>(store.as_ref(), SETTINGS_KEY).await? {
            Some(saved) => {
                tracing::debug!("Using persisted storage settings");
                saved
            }
            None => config.storage.clone(),
        };
        let (budget_tx, budget_rx) = watch::channel(budget);

        let ledger = Arc::new(
            StorageLedger::load(store.clone(), budget_rx.clone(), event_tx.clone()).await?,
        );

        // Offline until the platform reports otherwise
        let gate = ConnectivityGate::new(
            config.connectivity.clone(),
            Reachability::Offline,
            event_tx.clone(),
        );

        let scheduler = DownloadScheduler::load(
            store.clone(),
            catalog.clone(),
            ledger.clone(),
            config.download.clone(),
            budget_rx,
            gate.subscribe(),
            event_tx.clone(),
        )
        .await?;

        let sync = Arc::new(
            SyncQueue::load(
                store.clone(),
                catalog.clone(),
                config.sync.clone(),
                event_tx.clone(),
            )
            .await?,
        );

        match ledger.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(swept) => tracing::info!(swept, "Removed expired content at startup"),
            Err(e) => tracing::error!(error = %e, "Startup expiry sweep failed"),
        }

        Ok(Self {
            store,
            catalog,
            config: Arc::new(config),
            ledger,
            scheduler,
            sync,
            gate,
            budget_tx: Arc::new(budget_tx),
            settings_lock: Arc::new(Mutex::new(())),
            event_tx,
            background: Background::default(),
        })
    }

    /// Subscribe to events
    ///
    /// Multiple subscribers are supported; each receives every event. A
    /// subscriber more than 1000 events behind gets `RecvError::Lagged`.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stream of task progress updates only
    ///
    /// Updates missed by a lagging consumer are skipped.
    pub fn progress_stream(&self) -> impl Stream<Item = TaskProgress> + Send + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|event| match event {
            Ok(Event::Progress(progress)) => Some(progress),
            _ => None,
        })
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
