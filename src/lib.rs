//! # offline-sync
//!
//! Offline content download and mutation sync manager for learning apps.
//!
//! ## Design Philosophy
//!
//! offline-sync is designed to be:
//! - **Offline-first** - Local mutations are queued durably and delivered once a network is confirmed
//! - **Budget-aware** - Downloaded content stays within a storage budget with LRU eviction
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Components
//!
//! - [`ledger::StorageLedger`] - Durable index of retained content, budget and retention
//! - [`downloader::DownloadScheduler`] - Bounded-concurrency download queue with retries
//! - [`sync::SyncQueue`] - Ordered delivery of local mutations
//! - [`connectivity::ConnectivityGate`] - Debounced reachability driving both pipelines
//!
//! [`OfflineManager`] wires them together over one [`KvStore`](db::KvStore) and
//! one [`CatalogAdapter`](catalog::CatalogAdapter).
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_sync::{Config, ContentId, ContentKind, DownloadRequest, HttpCatalog, OfflineManager, Reachability};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(HttpCatalog::new("https://learn.example.com/api/")?);
//!     let manager = OfflineManager::new(Config::default(), catalog).await?;
//!     manager.start().await;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     manager.report_reachability(Reachability::Wifi);
//!     manager
//!         .download_tree(DownloadRequest::new(ContentId::new(ContentKind::Course, "rust-101")))
//!         .await?;
//!     manager
//!         .append(serde_json::json!({ "op": "complete_lesson", "lesson": "ownership" }))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote catalog access
pub mod catalog;
/// Configuration types
pub mod config;
/// Debounced network reachability
pub mod connectivity;
/// Persistence layer
pub mod db;
/// Download scheduler (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Storage ledger
pub mod ledger;
/// Offline manager facade
pub mod manager;
/// Retry logic with exponential backoff
pub mod retry;
/// Sync queue for local mutations
pub mod sync;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogAdapter, ContentDescriptor, HttpCatalog, MutationAck};
pub use config::{Config, DeliveryOrdering, EvictionPolicy, SettingsUpdate, StorageBudget};
pub use db::{Database, KvStore, MemoryStore};
pub use error::{
    CatalogError, DatabaseError, DownloadError, Error, Result, StorageError, SyncError,
};
pub use manager::OfflineManager;
pub use types::{
    ContentId, ContentKind, ContentRecord, DownloadRequest, DownloadTask, DrainReport, Event,
    EvictionReason, Quality, Reachability, SyncEntry, SyncEntryId, TaskId, TaskProgress,
    TaskStatus, UsageSnapshot,
};

/// Keep the manager running until the process is asked to stop, then shut it down.
///
/// On Unix this is SIGTERM or SIGINT; elsewhere, or when the handlers cannot
/// be registered, Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use offline_sync::{Config, HttpCatalog, OfflineManager, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = Arc::new(HttpCatalog::new("https://learn.example.com/api/")?);
///     let manager = OfflineManager::new(Config::default(), catalog).await?;
///     manager.start().await;
///
///     manager.report_reachability(offline_sync::Reachability::Wifi);
///     run_with_shutdown(manager).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: OfflineManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted sandboxes
    let (mut terminate, mut interrupt) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(terminate), Ok(interrupt)) => (terminate, interrupt),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Signal handlers unavailable, stopping on Ctrl+C only");
                wait_for_ctrl_c().await;
                return;
            }
        };

    let received = tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };
    tracing::info!(signal = received, "Stopping offline manager");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Stopping offline manager"),
        Err(e) => tracing::error!(error = %e, "Ctrl+C listener failed, stopping now"),
    }
}
