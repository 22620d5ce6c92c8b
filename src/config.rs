//! Configuration types for offline-sync

use crate::error::{Error, Result};
use crate::types::Quality;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Which items may be removed to admit new content when the budget is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict least-recently-accessed items first (default)
    #[default]
    LeastRecentlyAccessed,
    /// Never evict; a full budget rejects new content
    Never,
}

/// Storage budget and retention policy for offline content
///
/// Mutated only through [`OfflineManager::update_settings`](crate::OfflineManager::update_settings);
/// read by the storage ledger and the download scheduler before every admission decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageBudget {
    /// Maximum bytes of offline content (default: 2 GiB)
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: u64,

    /// Days after download before content expires (default: 30)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Only start transfers on an unmetered network (default: true)
    #[serde(default = "default_true")]
    pub wifi_only: bool,

    /// Media quality requested from the catalog (default: medium)
    #[serde(default)]
    pub preferred_quality: Quality,

    /// Eviction policy under budget pressure
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl Default for StorageBudget {
    fn default() -> Self {
        Self {
            max_storage_bytes: default_max_storage_bytes(),
            retention_days: default_retention_days(),
            wifi_only: true,
            preferred_quality: Quality::default(),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Partial update for [`StorageBudget`]; `None` fields are left unchanged
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// New storage budget in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_storage_bytes: Option<u64>,
    /// New retention window in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    /// New Wi-Fi-only flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_only: Option<bool>,
    /// New preferred quality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_quality: Option<Quality>,
    /// New eviction policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction: Option<EvictionPolicy>,
}

impl StorageBudget {
    /// Apply a partial update, returning the merged budget
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            max_storage_bytes: update.max_storage_bytes.unwrap_or(self.max_storage_bytes),
            retention_days: update.retention_days.unwrap_or(self.retention_days),
            wifi_only: update.wifi_only.unwrap_or(self.wifi_only),
            preferred_quality: update.preferred_quality.unwrap_or(self.preferred_quality),
            eviction: update.eviction.unwrap_or(self.eviction),
        }
    }

    /// Retention window as a chrono duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Download scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory for downloaded files (default: "./offline")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Maximum concurrent transfers (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// A transfer with no byte progress for this long fails (default: 60 seconds)
    #[serde(default = "default_stall_timeout", with = "duration_serde")]
    pub stall_timeout: Duration,

    /// Fetch thumbnails for videos and lessons (default: true)
    #[serde(default = "default_true")]
    pub fetch_thumbnails: bool,

    /// Retry policy for failed transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            stall_timeout: default_stall_timeout(),
            fetch_thumbnails: true,
            retry: RetryConfig::default(),
        }
    }
}

/// How a drain pass reacts to a failed delivery
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOrdering {
    /// Stop the pass at the first failure so later mutations never overtake it (default)
    #[default]
    Strict,
    /// Keep going past failures; failed entries are retried on a later pass
    BestEffort,
}

/// Sync queue configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// An entry whose attempt count reaches this ceiling is evicted (default: 4)
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Ordering policy for failed deliveries
    #[serde(default)]
    pub ordering: DeliveryOrdering,

    /// Delay policy for automatic re-drains after a failed pass
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: default_max_delivery_attempts(),
            ordering: DeliveryOrdering::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Connectivity gate configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Reachability must hold this long before "online" is declared (default: 2 seconds)
    #[serde(default = "default_confirmation_window", with = "duration_serde")]
    pub confirmation_window: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            confirmation_window: default_confirmation_window(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./offline-sync.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`OfflineManager`](crate::OfflineManager)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage budget (overridden by persisted settings on startup)
    #[serde(default)]
    pub storage: StorageBudget,

    /// Download scheduler settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Sync queue settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Connectivity gate settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Reject settings the components cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(config_error(
                "max_concurrent_downloads must be at least 1",
                "max_concurrent_downloads",
            ));
        }
        if self.storage.max_storage_bytes == 0 {
            return Err(config_error(
                "max_storage_bytes must be greater than 0",
                "max_storage_bytes",
            ));
        }
        if self.sync.max_delivery_attempts == 0 {
            return Err(config_error(
                "max_delivery_attempts must be at least 1",
                "max_delivery_attempts",
            ));
        }
        if self.download.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be >= 1.0",
                "download.retry.backoff_multiplier",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_max_storage_bytes() -> u64 {
    2048 * 1024 * 1024 // 2 GiB
}

fn default_retention_days() -> u32 {
    30
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("offline")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("offline-sync.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delivery_attempts() -> u32 {
    4
}

fn default_confirmation_window() -> Duration {
    Duration::from_secs(2)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
