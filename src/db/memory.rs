//! In-memory [`KvStore`] for tests and sessions that need no durability.

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::KvStore;

/// Key-value store held entirely in memory
///
/// Share one through an `Arc` to simulate a restart against the same data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut namespaces = self.namespaces.write().await;
        Ok(namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
