use crate::test_utils::{
    assert::assert_trustee_statuses, distribute_and_sync, sync_all, Network,
    RELAY, SECRET,
};
use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_recovery::{
    BackupStatus, Error, EventOutcome, InvitationLink, InvitationStatus,
    TrusteeStatus,
};
use pretty_assertions::assert_eq;

/// Invalidating a redeemed invitation removes the trustee and
/// makes them discard their share.
#[tokio::test]
async fn invitation_revocation() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let carol = network.participant("carol");
    let vault_id = VaultId::new_v4();

    let mut links: Vec<InvitationLink> = Vec::new();
    for trustee in [&alice, &bob, &carol] {
        let link = owner
            .recovery
            .invitations()
            .issue_invitation(
                vault_id,
                "Documents",
                Some(trustee.name.clone()),
                &[RELAY],
                &trustee.name,
            )
            .await?;
        trustee
            .recovery
            .invitations()
            .accept_invitation(&link, None)
            .await?;
        links.push(link);
    }
    sync_all(&[&owner]).await;
    owner.recovery.configurations().activate(&vault_id, 2).await?;
    distribute_and_sync(&owner, &[&alice, &bob, &carol], &vault_id).await?;
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 3],
    )
    .await?;

    let mut notifications = alice.recovery.subscribe();
    let link = owner
        .recovery
        .invitations()
        .invalidate(links[0].invite_code.as_str(), "moved away".to_string())
        .await?;
    assert_eq!(InvitationStatus::Invalidated, link.status);

    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::AwaitingNewKey, TrusteeStatus::AwaitingNewKey],
    )
    .await?;
    assert_eq!(2, config.distribution_version);
    assert_eq!(2, config.total_keys);
    assert!(config.trustee_by_key(&alice.public_key()).is_none());

    assert_eq!(vec![EventOutcome::Applied], alice.sync().await);
    assert!(alice.recovery.held_shares().get(&vault_id).await?.is_none());
    let notification = notifications.try_recv()?;
    assert_eq!(
        keyward_recovery::Notification::ShareRevoked { vault_id },
        notification
    );

    // Replaying the revocation changes nothing
    let revocation = alice
        .inbox()
        .await
        .into_iter()
        .last()
        .ok_or_else(|| anyhow!("revocation not published"))?;
    assert_eq!(EventOutcome::Duplicate, alice.replay(&revocation).await);

    let result = owner
        .recovery
        .invitations()
        .invalidate(links[0].invite_code.as_str(), "again".to_string())
        .await;
    assert!(matches!(result, Err(Error::InvitationInvalidated(_))));

    // Remaining trustees receive new shares
    distribute_and_sync(&owner, &[&bob, &carol], &vault_id).await?;
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 2],
    )
    .await?;

    Ok(())
}

/// Invalidating a pending invitation removes the placeholder
/// without changing the distribution version.
#[tokio::test]
async fn invitation_invalidate_pending() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let vault_id = VaultId::new_v4();

    owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "pending")
        .await?;
    owner
        .recovery
        .invitations()
        .invalidate("pending", "changed my mind".to_string())
        .await?;

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert!(config.trustees.is_empty());
    assert_eq!(1, config.distribution_version);
    assert!(network.transport.events().await.is_empty());

    Ok(())
}

/// Revoking a trustee of a vault with no spare trustees returns
/// the vault to draft until a replacement joins.
#[tokio::test]
async fn invitation_revocation_below_threshold() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let carol = network.participant("carol");
    let vault_id = VaultId::new_v4();

    for trustee in [&alice, &bob] {
        let link = owner
            .recovery
            .invitations()
            .issue_invitation(
                vault_id,
                "Documents",
                Some(trustee.name.clone()),
                &[RELAY],
                &trustee.name,
            )
            .await?;
        trustee
            .recovery
            .invitations()
            .accept_invitation(&link, None)
            .await?;
    }
    sync_all(&[&owner]).await;
    owner.recovery.configurations().activate(&vault_id, 2).await?;
    distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;

    owner
        .recovery
        .invitations()
        .invalidate("alice", "lost device".to_string())
        .await?;

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(BackupStatus::Draft, config.status);
    assert_eq!(2, config.threshold);
    assert_eq!(1, config.total_keys);
    assert_eq!(2, config.distribution_version);

    let result = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, SECRET)
        .await;
    assert!(matches!(result, Err(Error::ConfigurationNotActive(_))));

    // A replacement trustee restores the threshold
    let link = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "carol")
        .await?;
    carol
        .recovery
        .invitations()
        .accept_invitation(&link, None)
        .await?;
    sync_all(&[&owner, &alice]).await;

    let config = owner.recovery.configurations().activate(&vault_id, 2).await?;
    assert_eq!(2, config.total_keys);
    distribute_and_sync(&owner, &[&bob, &carol], &vault_id).await?;
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 2],
    )
    .await?;

    Ok(())
}
