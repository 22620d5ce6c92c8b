//! Versioned JSON envelope for persisted records
//!
//! Every value written to a [`KvStore`] is wrapped as
//! `{"schema": "<name>", "version": N, "data": {...}}`. On load, an entry whose
//! schema is wrong, whose version is newer than this build understands, or whose
//! data does not decode is dropped from the store and logged; the component
//! starts without it instead of failing.

use crate::config::StorageBudget;
use crate::types::{ContentRecord, DownloadTask, SyncEntry};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{KvStore, NS_CONTENT_RECORDS, NS_DOWNLOAD_TASKS, NS_STORAGE_SETTINGS, NS_SYNC_QUEUE};

/// Key under which the single settings document is stored
pub(crate) const SETTINGS_KEY: &str = "current";

/// A type persisted in its own namespace
pub(crate) trait PersistedRecord: Serialize + DeserializeOwned {
    /// Namespace the records live in
    const NAMESPACE: &'static str;
    /// Schema name written into the envelope
    const SCHEMA: &'static str;
    /// Current schema version
    const VERSION: u32;

    /// Key of this record within the namespace
    fn record_key(&self) -> String;

    /// Rewrite data stored by an older schema version into the current shape
    fn upgrade(_from_version: u32, data: serde_json::Value) -> serde_json::Value {
        data
    }
}

impl PersistedRecord for ContentRecord {
    const NAMESPACE: &'static str = NS_CONTENT_RECORDS;
    const SCHEMA: &'static str = "content_record";
    const VERSION: u32 = 1;

    fn record_key(&self) -> String {
        self.id.key()
    }
}

impl PersistedRecord for DownloadTask {
    const NAMESPACE: &'static str = NS_DOWNLOAD_TASKS;
    const SCHEMA: &'static str = "download_task";
    const VERSION: u32 = 1;

    fn record_key(&self) -> String {
        self.id.key()
    }
}

impl PersistedRecord for SyncEntry {
    const NAMESPACE: &'static str = NS_SYNC_QUEUE;
    const SCHEMA: &'static str = "sync_entry";
    const VERSION: u32 = 1;

    fn record_key(&self) -> String {
        self.id.key()
    }
}

impl PersistedRecord for StorageBudget {
    const NAMESPACE: &'static str = NS_STORAGE_SETTINGS;
    const SCHEMA: &'static str = "storage_settings";
    const VERSION: u32 = 1;

    fn record_key(&self) -> String {
        SETTINGS_KEY.to_string()
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema: &'a str,
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    schema: String,
    version: u32,
    data: T,
}

/// Serialize a record into its envelope
pub(crate) fn encode<T: PersistedRecord>(record: &T) -> Result<String> {
    Ok(serde_json::to_string(&EnvelopeRef {
        schema: T::SCHEMA,
        version: T::VERSION,
        data: record,
    })?)
}

/// Decode one stored value, reporting any problem as [`Error::CorruptState`]
pub(crate) fn decode<T: PersistedRecord>(key: &str, raw: &str) -> Result<T> {
    let corrupt = |reason: String| Error::CorruptState {
        namespace: T::NAMESPACE.to_string(),
        key: key.to_string(),
        reason,
    };

    let envelope: Envelope<serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| corrupt(format!("invalid envelope: {}", e)))?;

    if envelope.schema != T::SCHEMA {
        return Err(corrupt(format!(
            "expected schema {}, found {}",
            T::SCHEMA,
            envelope.schema
        )));
    }
    if envelope.version > T::VERSION {
        return Err(corrupt(format!(
            "unsupported version {} (newest known is {})",
            envelope.version,
            T::VERSION
        )));
    }

    let data = if envelope.version < T::VERSION {
        T::upgrade(envelope.version, envelope.data)
    } else {
        envelope.data
    };

    serde_json::from_value(data).map_err(|e| corrupt(format!("invalid data: {}", e)))
}

/// Write one record
pub(crate) async fn save<T: PersistedRecord>(store: &dyn KvStore, record: &T) -> Result<()> {
    let value = encode(record)?;
    store.put(T::NAMESPACE, &record.record_key(), &value).await
}

/// Delete one record by key
pub(crate) async fn remove<T: PersistedRecord>(store: &dyn KvStore, key: &str) -> Result<bool> {
    store.delete(T::NAMESPACE, key).await
}

/// Read one record; a corrupt value is dropped and reported as absent
pub(crate) async fn load_one<T: PersistedRecord>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(T::NAMESPACE, key).await? else {
        return Ok(None);
    };

    match decode::<T>(key, &raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            discard_corrupt::<T>(store, key, &e).await;
            Ok(None)
        }
    }
}

/// Read every record of the namespace in key order, dropping corrupt entries
pub(crate) async fn load_all<T: PersistedRecord>(store: &dyn KvStore) -> Result<Vec<T>> {
    let entries = store.list(T::NAMESPACE).await?;
    let mut records = Vec::with_capacity(entries.len());

    for (key, raw) in entries {
        match decode::<T>(&key, &raw) {
            Ok(record) => records.push(record),
            Err(e) => discard_corrupt::<T>(store, &key, &e).await,
        }
    }

    Ok(records)
}

async fn discard_corrupt<T: PersistedRecord>(store: &dyn KvStore, key: &str, error: &Error) {
    tracing::warn!(
        namespace = T::NAMESPACE,
        key = %key,
        error = %error,
        "Dropping corrupt persisted entry"
    );

    if let Err(e) = store.delete(T::NAMESPACE, key).await {
        tracing::error!(
            namespace = T::NAMESPACE,
            key = %key,
            error = %e,
            "Failed to delete corrupt persisted entry"
        );
    }
}
