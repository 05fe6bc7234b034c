use crate::{HeldShare, Result};
use keyward_core::VaultId;
use keyward_storage::{
    JsonStore, Namespace, PersistentStore, StorageProvider, StoreKey,
};

/// Shares the local trustee holds for other vaults.
///
/// Held shares are only removed when the owner revokes the
/// trustee; cancelling a recovery request never touches them.
pub struct HeldShareStore {
    store: StorageProvider,
}

impl HeldShareStore {
    /// Create a held share store.
    pub fn new(store: StorageProvider) -> Self {
        Self { store }
    }

    fn key(vault_id: &VaultId) -> Result<StoreKey> {
        Ok(StoreKey::new(Namespace::HeldShare, vault_id)?)
    }

    /// Share held for a vault.
    pub async fn get(&self, vault_id: &VaultId) -> Result<Option<HeldShare>> {
        Ok(self.store.read_json(&Self::key(vault_id)?).await?)
    }

    /// All held shares.
    pub async fn list(&self) -> Result<Vec<HeldShare>> {
        Ok(self.store.read_all_json(Namespace::HeldShare).await?)
    }

    pub(crate) async fn put(&self, share: &HeldShare) -> Result<()> {
        Ok(self
            .store
            .write_json(&Self::key(&share.vault_id)?, share)
            .await?)
    }

    pub(crate) async fn remove(&self, vault_id: &VaultId) -> Result<bool> {
        Ok(self.store.remove(&Self::key(vault_id)?).await?)
    }
}
