pub use keyward_test_utils as test_utils;

use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_recovery::{InvitationStatus, TrusteeStatus};
use keyward_storage::FileStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_utils::{
    assert::assert_trustee_statuses, create_vault, distribute_and_sync,
    setup, teardown, Network, RELAY,
};

const TEST_ID: &str = "storage_reopen";

/// Records written to disk are visible after the engine is
/// created again with the same identity and directory.
#[tokio::test]
async fn storage_reopen() -> Result<()> {
    //crate::test_utils::init_tracing();

    let dirs = setup(TEST_ID, 2).await?;
    let owner_dir = dirs.clients[0].clone();
    let alice_dir = dirs.clients[1].clone();

    let network = Network::new()?;
    let owner = network.participant_in("owner", owner_dir.clone());
    let alice = network.participant_in("alice", alice_dir.clone());
    let bob = network.participant("bob");

    let vault_id = create_vault(&owner, &[&alice, &bob], 2).await?;
    distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;
    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 2],
    )
    .await?;

    let draft_id = VaultId::new_v4();
    owner
        .recovery
        .invitations()
        .issue_invitation(draft_id, "Photos", None, &[RELAY], "photos-1")
        .await?;

    // One file per record, grouped by namespace
    assert!(owner_dir
        .join("backup-configuration")
        .join(format!("{}.json", vault_id))
        .is_file());
    assert!(owner_dir.join("invitation").join("photos-1.json").is_file());
    assert!(alice_dir
        .join("held-share")
        .join(format!("{}.json", vault_id))
        .is_file());

    let reopened = network.participant_with_identity(
        "owner",
        Arc::clone(&owner.identity),
        Arc::new(FileStore::new(&owner_dir)),
    );
    assert_eq!(
        config,
        reopened.recovery.configurations().require(&vault_id).await?
    );
    assert_eq!(2, reopened.recovery.configurations().list().await?.len());
    let link = reopened
        .recovery
        .invitations()
        .get(&"photos-1".parse()?)
        .await?
        .ok_or_else(|| anyhow!("invitation missing"))?;
    assert_eq!(InvitationStatus::Pending, link.status);

    let alice_again = network.participant_with_identity(
        "alice",
        Arc::clone(&alice.identity),
        Arc::new(FileStore::new(&alice_dir)),
    );
    assert_eq!(
        alice.recovery.held_shares().get(&vault_id).await?,
        alice_again.recovery.held_shares().get(&vault_id).await?
    );

    teardown(TEST_ID).await;

    Ok(())
}
