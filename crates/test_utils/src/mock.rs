//! Storage provider that fails writes on demand.
use async_trait::async_trait;
use keyward_storage::{
    MemoryStore, Namespace, PersistentStore, Result, StoreKey,
};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Memory store whose writes to chosen namespaces fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: RwLock<HashSet<Namespace>>,
}

impl FailingStore {
    /// Create a store where every write succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail writes and removals in a namespace.
    pub async fn fail_writes(&self, namespace: Namespace) {
        self.failing.write().await.insert(namespace);
    }

    /// Let writes in a namespace succeed again.
    pub async fn restore_writes(&self, namespace: Namespace) {
        self.failing.write().await.remove(&namespace);
    }

    async fn check(&self, key: &StoreKey) -> Result<()> {
        if self.failing.read().await.contains(&key.namespace) {
            let message = format!("write to {} failed", key);
            return Err(std::io::Error::other(message).into());
        }
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for FailingStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &StoreKey, value: Vec<u8>) -> Result<()> {
        self.check(key).await?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool> {
        self.check(key).await?;
        self.inner.remove(key).await
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>> {
        self.inner.list(namespace).await
    }
}
