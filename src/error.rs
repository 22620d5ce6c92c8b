//! Error types for offline-sync
//!
//! One top-level [`Error`] wraps the per-component error families:
//! - [`StorageError`] - storage budget enforcement in the ledger
//! - [`DownloadError`] - task lookup, state transitions, transfer integrity
//! - [`SyncError`] - sync queue delivery failures
//! - [`CatalogError`] - failures reported by the remote catalog adapter
//!
//! Every error carries a stable machine-readable code (see [`Error::error_code`])
//! which is forwarded in events so applications can branch without parsing
//! messages.

use crate::types::{SyncEntryId, TaskId};
use thiserror::Error;

/// Result type alias for offline-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for offline-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage budget error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Download task error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Sync queue error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Remote catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A persisted entry could not be decoded
    #[error("corrupt persisted state in {namespace}/{key}: {reason}")]
    CorruptState {
        /// Store namespace holding the entry
        namespace: String,
        /// Key of the entry
        key: String,
        /// Why decoding failed
        reason: String,
    },

    /// Item not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Storage ledger errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Admitting the item would exceed the storage budget, even after evicting
    /// every eligible candidate
    #[error(
        "storage budget exceeded: need {required} bytes, {available} bytes available of {budget}"
    )]
    BudgetExceeded {
        /// Bytes the new item needs
        required: u64,
        /// Bytes that could be made available (free space plus evictable items)
        available: u64,
        /// Configured budget
        budget: u64,
    },
}

/// Download task errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Task not found
    #[error("download task {id} not found")]
    NotFound {
        /// The task id that was not found
        id: TaskId,
    },

    /// Operation not valid from the task's current state
    #[error("cannot {operation} download task {id} in state {current_state}")]
    InvalidState {
        /// The task id
        id: TaskId,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The state that prevents the operation
        current_state: String,
    },

    /// No bytes arrived for the configured stall window
    #[error("download task {id} stalled: no progress for {secs}s")]
    Stalled {
        /// The task id
        id: TaskId,
        /// Length of the stall window in seconds
        secs: u64,
    },

    /// The stream ended with a byte count different from the descriptor's
    #[error("download task {id} size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The task id
        id: TaskId,
        /// Size announced by the catalog
        expected: u64,
        /// Bytes actually received
        actual: u64,
    },
}

/// Sync queue errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Entry exceeded the delivery attempt ceiling and was evicted
    #[error("sync entry {entry_id} permanently failed after {attempts} attempts: {last_error}")]
    PermanentDeliveryFailure {
        /// The evicted entry
        entry_id: SyncEntryId,
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },
}

/// Errors reported by a [`CatalogAdapter`](crate::catalog::CatalogAdapter)
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Temporary failure (timeout, connection reset, 5xx, 429)
    #[error("transient network error: {0}")]
    Transient(String),

    /// The requested content does not exist remotely
    #[error("remote content not found: {0}")]
    NotFound(String),

    /// The remote service refused the request
    #[error("rejected by remote service: {0}")]
    Rejected(String),

    /// HTTP client error not classified above
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Storage(StorageError::BudgetExceeded { .. }) => "budget_exceeded",
            Error::Download(e) => match e {
                DownloadError::NotFound { .. } => "task_not_found",
                DownloadError::InvalidState { .. } => "invalid_state",
                DownloadError::Stalled { .. } => "stalled",
                DownloadError::SizeMismatch { .. } => "size_mismatch",
            },
            Error::Sync(SyncError::PermanentDeliveryFailure { .. }) => {
                "permanent_delivery_failure"
            }
            Error::Catalog(e) => e.error_code(),
            Error::CorruptState { .. } => "corrupt_state",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl CatalogError {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CatalogError::Transient(_) => "catalog_transient",
            CatalogError::NotFound(_) => "catalog_not_found",
            CatalogError::Rejected(_) => "catalog_rejected",
            CatalogError::Http(_) => "catalog_http",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "zero concurrency".into(),
                    key: Some("max_concurrent_downloads".into()),
                },
                "config_error",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("locked".into())),
                "database_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (
                Error::Storage(StorageError::BudgetExceeded {
                    required: 60,
                    available: 40,
                    budget: 100,
                }),
                "budget_exceeded",
            ),
            (
                Error::Download(DownloadError::NotFound { id: TaskId(7) }),
                "task_not_found",
            ),
            (
                Error::Download(DownloadError::InvalidState {
                    id: TaskId(7),
                    operation: "pause".into(),
                    current_state: "pending".into(),
                }),
                "invalid_state",
            ),
            (
                Error::Download(DownloadError::Stalled {
                    id: TaskId(7),
                    secs: 60,
                }),
                "stalled",
            ),
            (
                Error::Download(DownloadError::SizeMismatch {
                    id: TaskId(7),
                    expected: 10,
                    actual: 9,
                }),
                "size_mismatch",
            ),
            (
                Error::Sync(SyncError::PermanentDeliveryFailure {
                    entry_id: SyncEntryId(1),
                    attempts: 4,
                    last_error: "503".into(),
                }),
                "permanent_delivery_failure",
            ),
            (
                Error::Catalog(CatalogError::Transient("reset".into())),
                "catalog_transient",
            ),
            (
                Error::Catalog(CatalogError::Rejected("422".into())),
                "catalog_rejected",
            ),
            (
                Error::CorruptState {
                    namespace: "syncQueue".into(),
                    key: "1".into(),
                    reason: "bad json".into(),
                },
                "corrupt_state",
            ),
            (Error::NotFound("video_1".into()), "not_found"),
            (Error::ShuttingDown, "shutting_down"),
            (Error::Other("boom".into()), "internal_error"),
        ]
    }

    #[test]
    fn every_variant_has_expected_error_code() {
        for (error, expected) in all_error_variants() {
            assert_eq!(error.error_code(), expected, "wrong code for {error:?}");
        }
    }

    #[test]
    fn budget_exceeded_message_includes_sizes() {
        let err = Error::Storage(StorageError::BudgetExceeded {
            required: 60,
            available: 40,
            budget: 100,
        });
        let msg = err.to_string();
        assert!(msg.contains("need 60 bytes"), "got: {msg}");
        assert!(msg.contains("40 bytes available of 100"), "got: {msg}");
    }

    #[test]
    fn invalid_state_message_names_operation_and_state() {
        let err = Error::Download(DownloadError::InvalidState {
            id: TaskId(3),
            operation: "resume".into(),
            current_state: "active".into(),
        });
        assert_eq!(
            err.to_string(),
            "download error: cannot resume download task 3 in state active"
        );
    }
}
