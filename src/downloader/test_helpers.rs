//! Shared test helpers: a scripted catalog and a scheduler wired to in-memory state.

use crate::catalog::{ByteStream, CatalogAdapter, ContentDescriptor, MutationAck};
use crate::config::{DownloadConfig, RetryConfig, StorageBudget};
use crate::db::MemoryStore;
use crate::downloader::DownloadScheduler;
use crate::error::CatalogError;
use crate::ledger::StorageLedger;
use crate::types::{ContentId, DownloadTask, Event, Quality, Reachability, TaskId, TaskStatus};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, watch};

/// Bytes per chunk emitted by [`MockCatalog`] streams
pub(crate) const CHUNK_SIZE: usize = 4;

/// How a mock byte stream behaves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamBehavior {
    /// Emit the whole body and end
    Complete,
    /// Emit the first chunk, then never produce another
    Hang,
    /// End one byte short of the declared size
    Truncate,
}

struct MockItem {
    descriptor: ContentDescriptor,
    body: Vec<u8>,
    behavior: StreamBehavior,
    open_failures: u32,
}

/// Scripted [`CatalogAdapter`] for tests
#[derive(Default)]
pub(crate) struct MockCatalog {
    items: Mutex<HashMap<ContentId, MockItem>>,
    thumbnails: Mutex<HashMap<ContentId, Vec<u8>>>,
    /// Remaining transient failures per serialized payload (u32::MAX = always)
    submit_failures: Mutex<HashMap<String, u32>>,
    submitted: Mutex<Vec<serde_json::Value>>,
    delivered: Mutex<Vec<serde_json::Value>>,
    submit_delay: Mutex<Duration>,
    opens: AtomicU32,
}

impl MockCatalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `id`, declaring its exact size
    pub(crate) fn add_item(&self, id: &ContentId, body: &[u8]) -> ContentDescriptor {
        self.add_item_with(id, body, StreamBehavior::Complete)
    }

    pub(crate) fn add_item_with(
        &self,
        id: &ContentId,
        body: &[u8],
        behavior: StreamBehavior,
    ) -> ContentDescriptor {
        let mut descriptor = ContentDescriptor::new(id.clone(), format!("Title {}", id.id));
        descriptor.byte_size = body.len() as u64;
        descriptor.url = Some(format!("media/{}", id.key()));

        self.items.lock().unwrap().insert(
            id.clone(),
            MockItem {
                descriptor: descriptor.clone(),
                body: body.to_vec(),
                behavior,
                open_failures: 0,
            },
        );
        descriptor
    }

    /// Change the descriptor of an existing item
    pub(crate) fn update_descriptor(&self, id: &ContentId, f: impl FnOnce(&mut ContentDescriptor)) {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(id).expect("unknown mock item");
        f(&mut item.descriptor);
    }

    /// Fail the next `n` stream opens for `id` with a transient error
    pub(crate) fn fail_opens(&self, id: &ContentId, n: u32) {
        self.items
            .lock()
            .unwrap()
            .get_mut(id)
            .expect("unknown mock item")
            .open_failures = n;
    }

    pub(crate) fn set_thumbnail(&self, id: &ContentId, bytes: &[u8]) {
        self.update_descriptor(id, |d| d.thumbnail_url = Some(format!("thumbs/{}", id.key())));
        self.thumbnails
            .lock()
            .unwrap()
            .insert(id.clone(), bytes.to_vec());
    }

    /// Fail delivery of `payload` `times` times (u32::MAX = forever)
    pub(crate) fn fail_submissions(&self, payload: &serde_json::Value, times: u32) {
        self.submit_failures
            .lock()
            .unwrap()
            .insert(payload.to_string(), times);
    }

    pub(crate) fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Every submission attempt, in order
    pub(crate) fn submitted(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().unwrap().clone()
    }

    /// Acknowledged submissions, in order
    pub(crate) fn delivered(&self) -> Vec<serde_json::Value> {
        self.delivered.lock().unwrap().clone()
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogAdapter for MockCatalog {
    async fn fetch_content_descriptor(
        &self,
        id: &ContentId,
    ) -> Result<ContentDescriptor, CatalogError> {
        self.items
            .lock()
            .unwrap()
            .get(id)
            .map(|item| item.descriptor.clone())
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn open_byte_stream(
        &self,
        descriptor: &ContentDescriptor,
        _quality: Quality,
    ) -> Result<ByteStream, CatalogError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (body, behavior) = {
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(&descriptor.id)
                .ok_or_else(|| CatalogError::NotFound(descriptor.id.to_string()))?;
            if item.open_failures > 0 {
                item.open_failures -= 1;
                return Err(CatalogError::Transient("connection reset".into()));
            }
            (item.body.clone(), item.behavior)
        };

        let chunks: Vec<Result<Vec<u8>, CatalogError>> =
            body.chunks(CHUNK_SIZE).map(|c| Ok(c.to_vec())).collect();

        let stream = match behavior {
            StreamBehavior::Complete => futures::stream::iter(chunks).boxed(),
            StreamBehavior::Hang => futures::stream::iter(chunks.into_iter().take(1))
                .chain(futures::stream::pending())
                .boxed(),
            StreamBehavior::Truncate => {
                let short = body[..body.len().saturating_sub(1)].to_vec();
                futures::stream::iter(vec![Ok(short)]).boxed()
            }
        };
        Ok(stream)
    }

    async fn submit_mutation(
        &self,
        payload: &serde_json::Value,
    ) -> Result<MutationAck, CatalogError> {
        self.submitted.lock().unwrap().push(payload.clone());

        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.submit_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&payload.to_string())
                && *remaining > 0
            {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(CatalogError::Transient("service unavailable".into()));
            }
        }

        let mut delivered = self.delivered.lock().unwrap();
        delivered.push(payload.clone());
        Ok(MutationAck {
            id: Some(delivered.len().to_string()),
        })
    }

    async fn fetch_thumbnail(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.thumbnails.lock().unwrap().get(&descriptor.id).cloned())
    }
}

/// Download settings for tests: small concurrency and fast retries
pub(crate) fn test_download_config(dir: &std::path::Path) -> DownloadConfig {
    DownloadConfig {
        storage_dir: dir.join("offline"),
        max_concurrent_downloads: 2,
        stall_timeout: Duration::from_secs(60),
        fetch_thumbnails: true,
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// A scheduler over in-memory state with its collaborators exposed
pub(crate) struct SchedulerHarness {
    pub(crate) scheduler: DownloadScheduler,
    pub(crate) catalog: Arc<MockCatalog>,
    pub(crate) ledger: Arc<StorageLedger>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) budget_tx: watch::Sender<StorageBudget>,
    pub(crate) reachability_tx: watch::Sender<Reachability>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) dir: TempDir,
}

/// Scheduler with default test config, on Wi-Fi, without the driver running
pub(crate) async fn create_test_scheduler() -> SchedulerHarness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_download_config(dir.path());
    create_test_scheduler_with(
        dir,
        config,
        StorageBudget::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MockCatalog::new()),
    )
    .await
}

pub(crate) async fn create_test_scheduler_with(
    dir: TempDir,
    config: DownloadConfig,
    budget: StorageBudget,
    store: Arc<MemoryStore>,
    catalog: Arc<MockCatalog>,
) -> SchedulerHarness {
    let (budget_tx, budget_rx) = watch::channel(budget);
    let (reachability_tx, reachability_rx) = watch::channel(Reachability::Wifi);
    let (event_tx, events) = broadcast::channel(1000);

    let ledger = Arc::new(
        StorageLedger::load(store.clone(), budget_rx.clone(), event_tx.clone())
            .await
            .unwrap(),
    );
    let scheduler = DownloadScheduler::load(
        store.clone(),
        catalog.clone(),
        ledger.clone(),
        config,
        budget_rx,
        reachability_rx,
        event_tx,
    )
    .await
    .unwrap();

    SchedulerHarness {
        scheduler,
        catalog,
        ledger,
        store,
        budget_tx,
        reachability_tx,
        events,
        dir,
    }
}

/// Poll until the task reaches `status` (panics after 5 seconds)
pub(crate) async fn wait_for_status(
    scheduler: &DownloadScheduler,
    id: TaskId,
    status: TaskStatus,
) -> DownloadTask {
    wait_for_task(scheduler, id, |t| t.status == status).await
}

/// Poll until `predicate` holds for the task (panics after 5 seconds)
pub(crate) async fn wait_for_task(
    scheduler: &DownloadScheduler,
    id: TaskId,
    predicate: impl Fn(&DownloadTask) -> bool,
) -> DownloadTask {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = scheduler.task(id).await;
        if let Some(task) = &task
            && predicate(task)
        {
            return task.clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for task {id}, last seen: {task:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub(crate) fn video(id: &str) -> ContentId {
    ContentId::new(crate::types::ContentKind::Video, id)
}

/// Leftover partial files under the storage root
pub(crate) fn part_files(storage_dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let Ok(kinds) = std::fs::read_dir(storage_dir) else {
        return found;
    };
    for kind in kinds.flatten() {
        let Ok(files) = std::fs::read_dir(kind.path()) else {
            continue;
        };
        for file in files.flatten() {
            if file.path().extension().is_some_and(|e| e == "part") {
                found.push(file.path());
            }
        }
    }
    found
}

/// Poll until `condition` holds (panics after 5 seconds)
pub(crate) async fn wait_until<F, Fut>(what: &str, condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
