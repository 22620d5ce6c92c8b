//! Test configuration helpers for creating managers against a mock catalog server

use offline_sync::config::{
    ConnectivityConfig, DownloadConfig, PersistenceConfig, RetryConfig, SyncConfig,
};
use offline_sync::{Config, HttpCatalog, OfflineManager};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Retry policy with millisecond delays so failure paths finish quickly
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config rooted in `dir`: SQLite file, storage directory and fast timings
pub fn test_config(dir: &Path) -> Config {
    Config {
        download: DownloadConfig {
            storage_dir: dir.join("offline"),
            max_concurrent_downloads: 2,
            retry: fast_retry(),
            ..Default::default()
        },
        sync: SyncConfig {
            retry: fast_retry(),
            ..Default::default()
        },
        connectivity: ConnectivityConfig {
            confirmation_window: Duration::from_millis(20),
        },
        persistence: PersistenceConfig {
            database_path: dir.join("offline-sync.db"),
        },
        ..Default::default()
    }
}

/// Base url of the catalog API on a mock server
pub fn api_base(server_uri: &str) -> String {
    format!("{}/api/", server_uri)
}

/// Create and start a manager talking to the catalog at `server_uri`
///
/// The returned TempDir must be kept alive for the duration of the test.
pub async fn create_manager(server_uri: &str) -> (OfflineManager, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let manager = create_manager_in(server_uri, temp_dir.path()).await;
    (manager, temp_dir)
}

/// Create and start a manager whose database and files live in `dir`
pub async fn create_manager_in(server_uri: &str, dir: &Path) -> OfflineManager {
    let catalog = Arc::new(HttpCatalog::new(&api_base(server_uri)).expect("valid base url"));
    let manager = OfflineManager::new(test_config(dir), catalog)
        .await
        .expect("Failed to create manager");
    manager.start().await;
    manager
}
