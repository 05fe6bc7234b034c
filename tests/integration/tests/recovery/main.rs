mod duplicate_request;
mod mixed_shares;

pub use keyward_test_utils as test_utils;

use anyhow::Result;
use keyward_core::VaultId;
use keyward_storage::MemoryStore;
use std::sync::Arc;
use test_utils::{
    create_vault, distribute_and_sync, Network, Participant,
};

/// Vault with three trustees holding their shares and a second
/// device for the owner that lost the secret.
pub struct RecoveryFixture {
    pub network: Network,
    pub owner: Participant,
    pub device: Participant,
    pub trustees: Vec<Participant>,
    pub vault_id: VaultId,
}

impl RecoveryFixture {
    pub async fn new() -> Result<Self> {
        let network = Network::new()?;
        let owner = network.participant("owner");
        let alice = network.participant("alice");
        let bob = network.participant("bob");
        let carol = network.participant("carol");

        let vault_id = create_vault(&owner, &[&alice, &bob, &carol], 2).await?;
        distribute_and_sync(&owner, &[&alice, &bob, &carol], &vault_id).await?;

        // Same identity, empty storage
        let device = network.participant_with_identity(
            "device",
            Arc::clone(&owner.identity),
            Arc::new(MemoryStore::new()),
        );
        // Events sent to the owner before the device existed
        device.sync().await;

        Ok(Self {
            network,
            owner,
            device,
            trustees: vec![alice, bob, carol],
            vault_id,
        })
    }

    pub fn trustee_keys(&self) -> Vec<keyward_core::PublicKey> {
        self.trustees.iter().map(|t| t.public_key()).collect()
    }
}
