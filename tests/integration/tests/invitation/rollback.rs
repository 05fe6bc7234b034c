use crate::test_utils::{mock::FailingStore, Network, RELAY};
use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_recovery::{Error, InvitationStatus, TrusteeStatus};
use keyward_storage::Namespace;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// An invitation whose placeholder cannot be saved is not kept.
#[tokio::test]
async fn invitation_failed_placeholder() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let store = Arc::new(FailingStore::new());
    let owner = network.participant_with_store("owner", Arc::<FailingStore>::clone(&store));
    let vault_id = VaultId::new_v4();

    owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "first")
        .await?;

    store.fail_writes(Namespace::BackupConfiguration).await;
    let result = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "second")
        .await;
    assert!(matches!(result, Err(Error::Storage(_))));
    assert!(owner
        .recovery
        .invitations()
        .get(&"second".parse()?)
        .await?
        .is_none());
    store.restore_writes(Namespace::BackupConfiguration).await;

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(1, config.trustees.len());

    // The code is free to be issued again
    owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "second")
        .await?;
    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(2, config.trustees.len());

    Ok(())
}

/// A redemption that cannot update the configuration leaves the
/// invitation pending.
#[tokio::test]
async fn invitation_failed_redemption() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let store = Arc::new(FailingStore::new());
    let owner = network.participant_with_store("owner", Arc::<FailingStore>::clone(&store));
    let dana = network.participant("dana");
    let vault_id = VaultId::new_v4();

    owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "dana")
        .await?;

    store.fail_writes(Namespace::BackupConfiguration).await;
    let result = owner
        .recovery
        .invitations()
        .redeem("dana", &dana.public_key(), Some("Dana"))
        .await;
    assert!(matches!(result, Err(Error::Storage(_))));
    store.restore_writes(Namespace::BackupConfiguration).await;

    let link = owner
        .recovery
        .invitations()
        .get(&"dana".parse()?)
        .await?
        .ok_or_else(|| anyhow!("invitation missing"))?;
    assert_eq!(InvitationStatus::Pending, link.status);
    assert!(link.redeemed_by.is_none());
    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert!(config.trustees[0].public_key.is_none());

    let trustee = owner
        .recovery
        .invitations()
        .redeem("dana", &dana.public_key(), Some("Dana"))
        .await?;
    assert_eq!(Some(dana.public_key()), trustee.public_key);
    assert_eq!(TrusteeStatus::AwaitingKey, trustee.status);

    let link = owner
        .recovery
        .invitations()
        .get(&"dana".parse()?)
        .await?
        .ok_or_else(|| anyhow!("invitation missing"))?;
    assert_eq!(InvitationStatus::Redeemed, link.status);

    Ok(())
}
