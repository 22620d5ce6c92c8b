//! Core types for offline-sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of downloadable content
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Course metadata (title, syllabus, lesson list)
    Course,
    /// Lesson metadata and body
    Lesson,
    /// Lesson video media
    Video,
    /// Attached document (PDF, slides, ...)
    Document,
}

impl ContentKind {
    /// Lowercase name used in ids, paths and URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Course => "course",
            ContentKind::Lesson => "lesson",
            ContentKind::Video => "video",
            ContentKind::Document => "document",
        }
    }

    /// Directory (relative to the storage root) holding files of this kind
    pub fn directory(&self) -> &'static str {
        match self {
            ContentKind::Course => "courses",
            ContentKind::Lesson => "lessons",
            ContentKind::Video => "videos",
            ContentKind::Document => "documents",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(ContentKind::Course),
            "lesson" => Ok(ContentKind::Lesson),
            "video" => Ok(ContentKind::Video),
            "document" => Ok(ContentKind::Document),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// Stable identity of a content item, scoped by kind.
///
/// Two items with the same remote id but different kinds are distinct
/// (`video_42` and `document_42`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentId {
    /// Content kind
    pub kind: ContentKind,
    /// Remote identifier within the kind
    pub id: String,
}

impl ContentId {
    /// Create a new content id
    pub fn new(kind: ContentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Key used for persistence (`<kind>_<id>`)
    pub fn key(&self) -> String {
        format!("{}_{}", self.kind, self.id)
    }

    /// File name stem for this item (`<kind>_<id>`)
    ///
    /// The remote id is opaque, so every byte outside `[A-Za-z0-9_-]` is
    /// percent-encoded. The result never contains a path separator or `.`.
    pub fn file_stem(&self) -> String {
        let mut stem = format!("{}_", self.kind);
        for byte in self.id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("%{:02X}", byte));
            }
        }
        stem
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.kind, self.id)
    }
}

/// Unique identifier for a download task (monotonic, enqueue order)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Zero-padded persistence key, so key order equals enqueue order
    pub(crate) fn key(&self) -> String {
        format!("{:020}", self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a queued sync mutation (monotonic, enqueue order)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SyncEntryId(pub u64);

impl SyncEntryId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }

    pub(crate) fn key(&self) -> String {
        format!("{:020}", self.0)
    }
}

impl std::fmt::Display for SyncEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media quality requested from the catalog
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Smallest files
    Low,
    /// Balanced (default)
    #[default]
    Medium,
    /// Largest files
    High,
}

/// One locally retained content item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Identity (kind + remote id)
    pub id: ContentId,
    /// Display title
    pub title: String,
    /// Size of the content file in bytes
    pub byte_size: u64,
    /// Location of the downloaded bytes
    pub storage_path: PathBuf,
    /// Location of the thumbnail, if one was fetched
    #[serde(default)]
    pub thumbnail_path: Option<PathBuf>,
    /// When the download completed
    pub downloaded_at: DateTime<Utc>,
    /// Last time the application read this item
    pub last_accessed_at: DateTime<Utc>,
    /// Whether all bytes are present
    pub is_complete: bool,
    /// Hard expiry set by the catalog, independent of retention
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    /// Content kind shortcut
    pub fn kind(&self) -> ContentKind {
        self.id.kind
    }
}

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for admission
    Pending,
    /// Transfer in progress
    Active,
    /// Paused by the user
    Paused,
    /// Bytes stored and recorded in the ledger
    Completed,
    /// Failed; retried automatically while a retry is scheduled
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a state the scheduler no longer drives
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One queued or in-flight transfer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Task id
    pub id: TaskId,
    /// Content being downloaded
    pub target: ContentId,
    /// Display title (from the request or the descriptor)
    pub title: String,
    /// Expected size in bytes (0 until known)
    pub total_bytes: u64,
    /// Bytes written so far
    pub transferred_bytes: u64,
    /// Current status
    pub status: TaskStatus,
    /// Last error message
    #[serde(default)]
    pub last_error: Option<String>,
    /// Machine-readable code of the last error
    #[serde(default)]
    pub last_error_code: Option<String>,
    /// Failed transfer attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// When a failed task becomes eligible for another attempt (None = terminal)
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
    /// When the task was enqueued
    pub created_at: DateTime<Utc>,
}

impl DownloadTask {
    /// Failed with no retry scheduled
    pub fn is_terminally_failed(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_at.is_none()
    }

    /// Pending, active, paused, or failed with a retry scheduled
    pub fn is_live(&self) -> bool {
        match self.status {
            TaskStatus::Pending | TaskStatus::Active | TaskStatus::Paused => true,
            TaskStatus::Failed => self.retry_at.is_some(),
            TaskStatus::Completed => false,
        }
    }

    /// Progress payload delivered to subscribers
    pub fn progress(&self) -> TaskProgress {
        TaskProgress {
            task_id: self.id,
            transferred_bytes: self.transferred_bytes,
            total_bytes: self.total_bytes,
            status: self.status,
        }
    }
}

/// Request to download one content item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Content to download
    pub content: ContentId,
    /// Title shown before the descriptor is fetched
    #[serde(default)]
    pub title: Option<String>,
    /// Size hint in bytes; enables the budget check at enqueue time
    #[serde(default)]
    pub expected_bytes: Option<u64>,
}

impl DownloadRequest {
    /// Request without hints
    pub fn new(content: ContentId) -> Self {
        Self {
            content,
            title: None,
            expected_bytes: None,
        }
    }

    /// Attach a size hint
    pub fn with_expected_bytes(mut self, bytes: u64) -> Self {
        self.expected_bytes = Some(bytes);
        self
    }

    /// Attach a title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Progress update for one task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Task id
    pub task_id: TaskId,
    /// Bytes written so far
    pub transferred_bytes: u64,
    /// Expected size in bytes
    pub total_bytes: u64,
    /// Status at the time of the update
    pub status: TaskStatus,
}

/// One queued local mutation awaiting delivery
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Entry id
    pub id: SyncEntryId,
    /// Mutation payload, opaque to the queue
    pub payload: serde_json::Value,
    /// When the mutation was appended
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempt_count: u32,
    /// When delivery was last attempted
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error from the last failed attempt
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Point-in-time storage usage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Configured budget in bytes
    pub total_budget: u64,
    /// Bytes held by recorded items
    pub used: u64,
    /// Remaining budget (saturating)
    pub available: u64,
    /// Number of recorded items
    pub item_count: usize,
}

/// Outcome of one drain pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Entries acknowledged and removed
    pub delivered: usize,
    /// Entries still queued after the pass
    pub remaining: usize,
    /// Entries evicted after exceeding the attempt ceiling
    pub evicted: usize,
}

/// Why a content record was removed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Explicit request from the application
    Manual,
    /// Freed to admit a new item under the storage budget
    BudgetPressure,
    /// Older than the retention window or past its expiry
    Expired,
}

/// Network reachability as reported by the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// No usable network
    #[default]
    Offline,
    /// Metered mobile network
    Cellular,
    /// Unmetered network
    Wifi,
}

impl Reachability {
    /// Any network at all
    pub fn is_online(&self) -> bool {
        !matches!(self, Reachability::Offline)
    }
}

/// Event emitted by the offline manager
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task admitted to the queue
    Queued {
        /// Task id
        task_id: TaskId,
        /// Target content
        content_id: ContentId,
    },

    /// Task progress or status change
    Progress(TaskProgress),

    /// Task finished and its content is recorded
    Completed {
        /// Task id
        task_id: TaskId,
        /// Recorded content
        content_id: ContentId,
        /// Bytes stored
        bytes: u64,
    },

    /// Task attempt failed
    TaskFailed {
        /// Task id
        task_id: TaskId,
        /// Error message
        error: String,
        /// Machine-readable error code
        error_code: String,
        /// Whether no further automatic retry will happen
        terminal: bool,
    },

    /// Task removed (cancelled or dismissed)
    Removed {
        /// Task id
        task_id: TaskId,
    },

    /// Content record and files removed
    ContentEvicted {
        /// Evicted content
        content_id: ContentId,
        /// Why it was evicted
        reason: EvictionReason,
    },

    /// Sync entry acknowledged by the remote service
    SyncDelivered {
        /// Entry id
        entry_id: SyncEntryId,
    },

    /// Sync entry dropped after exceeding the attempt ceiling
    SyncEntryEvicted {
        /// Entry id
        entry_id: SyncEntryId,
        /// Attempts made
        attempts: u32,
        /// Last delivery error
        error: String,
    },

    /// A drain pass finished
    DrainFinished(DrainReport),

    /// Confirmed connectivity transition
    ConnectivityChanged {
        /// New reachability
        reachability: Reachability,
    },

    /// Manager is shutting down
    Shutdown,
}
