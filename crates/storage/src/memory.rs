use crate::{Namespace, PersistentStore, Result, StoreKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Store records in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn set(&self, key: &StoreKey, value: Vec<u8>) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(key).is_some())
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>> {
        let records = self.records.read().await;
        Ok(records
            .keys()
            .filter(|k| k.namespace == namespace)
            .map(|k| k.id.clone())
            .collect())
    }
}
