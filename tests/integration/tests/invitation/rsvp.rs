use crate::test_utils::{Network, RELAY};
use anyhow::{anyhow, Result};
use keyward_core::{Config, VaultId};
use keyward_recovery::{
    BackupStatus, Error, EventOutcome, InvitationStatus, TrusteeStatus,
};
use keyward_storage::{MemoryStore, StorageProvider};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Redeeming an invitation fills in the placeholder trustee and
/// repeating the RSVP changes nothing.
#[tokio::test]
async fn invitation_rsvp_idempotent() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let dana = network.participant("dana");
    let vault_id = VaultId::new_v4();

    let link = owner
        .recovery
        .invitations()
        .issue_invitation(
            vault_id,
            "Documents",
            Some("Dana".to_string()),
            &[RELAY],
            "XYZ",
        )
        .await?;
    assert_eq!(InvitationStatus::Pending, link.status);
    assert_eq!(owner.public_key(), link.owner_public_key);

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(BackupStatus::Draft, config.status);
    assert_eq!(1, config.trustees.len());
    let placeholder = &config.trustees[0];
    assert!(placeholder.public_key.is_none());
    assert_eq!(TrusteeStatus::Invited, placeholder.status);
    assert_eq!(
        Some("XYZ"),
        placeholder.invite_code.as_ref().map(|c| c.as_str())
    );

    // The same code cannot be issued twice
    let result = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "XYZ")
        .await;
    assert!(matches!(result, Err(Error::InvitationExists(_))));

    dana.recovery
        .invitations()
        .accept_invitation(&link, Some("Dana".to_string()))
        .await?;
    assert_eq!(vec![EventOutcome::Applied], owner.sync().await);

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(1, config.trustees.len());
    let trustee = &config.trustees[0];
    assert_eq!(placeholder.id, trustee.id);
    assert_eq!(Some(dana.public_key()), trustee.public_key);
    assert_eq!(TrusteeStatus::AwaitingKey, trustee.status);
    assert_eq!(1, config.distribution_version);

    let link = owner
        .recovery
        .invitations()
        .get(&"XYZ".parse()?)
        .await?
        .ok_or_else(|| anyhow!("invitation missing"))?;
    assert_eq!(InvitationStatus::Redeemed, link.status);
    assert_eq!(Some(dana.public_key()), link.redeemed_by);

    // Deliver the same RSVP again
    let rsvp = owner
        .inbox()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("rsvp not published"))?;
    assert_eq!(EventOutcome::Duplicate, owner.replay(&rsvp).await);
    let after = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(config, after);

    Ok(())
}

/// Gather trustees by invitation and activate the vault.
#[tokio::test]
async fn invitation_activate_draft() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let vault_id = VaultId::new_v4();

    for trustee in [&alice, &bob] {
        let link = owner
            .recovery
            .invitations()
            .generate_invitation_link::<&str>(
                vault_id,
                "Documents",
                Some(trustee.name.clone()),
                &[],
            )
            .await?;
        assert_eq!(32, link.invite_code.as_str().len());
        trustee.recovery.invitations().accept_invitation(&link, None).await?;
    }
    assert_eq!(
        vec![EventOutcome::Applied, EventOutcome::Applied],
        owner.sync().await
    );

    // Distribution waits for the vault to be activated
    let result = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, crate::test_utils::SECRET)
        .await;
    assert!(matches!(result, Err(Error::ConfigurationNotActive(_))));

    let result = owner.recovery.configurations().activate(&vault_id, 3).await;
    assert!(matches!(result, Err(Error::InvalidThreshold { .. })));

    let config = owner.recovery.configurations().activate(&vault_id, 2).await?;
    assert_eq!(BackupStatus::Active, config.status);
    assert_eq!(2, config.total_keys);

    let results = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, crate::test_utils::SECRET)
        .await?;
    assert_eq!(2, results.len());

    Ok(())
}

/// Owners cannot become trustees of their own vault and
/// malformed codes are rejected.
#[tokio::test]
async fn invitation_validation() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let store: StorageProvider = Arc::new(MemoryStore::new());
    let owner = network.participant_with_store("owner", Arc::clone(&store));
    let vault_id = VaultId::new_v4();

    let link = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "self")
        .await?;
    let result = owner
        .recovery
        .invitations()
        .accept_invitation(&link, None)
        .await;
    assert!(matches!(result, Err(Error::SelfInvitationRejected)));
    let result = owner
        .recovery
        .invitations()
        .redeem("self", &owner.public_key(), None)
        .await;
    assert!(matches!(result, Err(Error::SelfInvitationRejected)));

    let result = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "not a code!")
        .await;
    assert!(matches!(result, Err(Error::InvalidInviteCodeFormat(_))));

    let result = owner
        .recovery
        .invitations()
        .redeem("unknown", &owner.public_key(), None)
        .await;
    assert!(matches!(result, Err(Error::InvitationNotFound(_))));

    let relays = [
        "wss://one.keyward.test",
        "wss://two.keyward.test",
        "wss://three.keyward.test",
        "wss://four.keyward.test",
    ];
    let result = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &relays, "many-relays")
        .await;
    assert!(matches!(result, Err(Error::InvalidRelaySet(_))));

    // A second identity sharing the store does not own the vault
    let other = network.participant_with_store("other", store);
    let result = other
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &[RELAY], "other")
        .await;
    assert!(matches!(result, Err(Error::NotVaultOwner(_))));

    Ok(())
}

/// A configured relay limit below the protocol maximum applies
/// to new invitations.
#[tokio::test]
async fn invitation_configured_relay_limit() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::with_config(Config {
        default_relays: vec![RELAY.parse()?],
        max_relays: 2,
        ..Default::default()
    });
    let owner = network.participant("owner");
    let vault_id = VaultId::new_v4();

    let relays = [
        "wss://one.keyward.test",
        "wss://two.keyward.test",
        "wss://three.keyward.test",
    ];
    let result = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &relays, "three")
        .await;
    assert!(matches!(result, Err(Error::InvalidRelaySet(_))));

    let link = owner
        .recovery
        .invitations()
        .issue_invitation(vault_id, "Documents", None, &relays[..2], "two")
        .await?;
    assert_eq!(2, link.relays.len());

    Ok(())
}
