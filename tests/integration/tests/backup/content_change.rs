use crate::test_utils::{
    assert::assert_trustee_statuses, distribute_and_sync, relays, Network,
};
use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_recovery::{
    ConfigurationUpdate, EventOutcome, Trustee, TrusteeStatus,
};
use pretty_assertions::assert_eq;

/// Changing the secret makes every distributed share outdated
/// while invitations stay untouched.
#[tokio::test]
async fn backup_content_change() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");

    let vault_id = VaultId::new_v4();
    owner
        .recovery
        .configurations()
        .create(
            owner.public_key(),
            vault_id,
            "Family photos".to_string(),
            2,
            3,
            vec![
                Trustee::new_with_key("alice", alice.public_key()),
                Trustee::new_with_key("bob", bob.public_key()),
                Trustee::new_invited("dana", "XYZ".parse()?),
            ],
            relays()?,
        )
        .await?;

    let results = distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;
    assert_eq!(3, results.len());
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[
            TrusteeStatus::HoldingKey,
            TrusteeStatus::HoldingKey,
            TrusteeStatus::Invited,
        ],
    )
    .await?;
    let old_shares = alice.inbox().await;

    let config = owner
        .recovery
        .configurations()
        .handle_content_change(&vault_id)
        .await?;
    assert_eq!(2, config.distribution_version);
    for trustee in config.trustees.iter().filter(|t| !t.is_placeholder()) {
        assert_eq!(TrusteeStatus::AwaitingNewKey, trustee.status);
        assert!(trustee.acknowledged_at.is_none());
        assert!(trustee.acknowledgment_event_id.is_none());
        assert!(trustee.acknowledged_distribution_version.is_none());
        assert!(trustee.held_share.is_none());
    }
    assert_eq!(TrusteeStatus::Invited, config.trustees[2].status);

    distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;
    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[
            TrusteeStatus::HoldingKey,
            TrusteeStatus::HoldingKey,
            TrusteeStatus::Invited,
        ],
    )
    .await?;
    assert_eq!(Some(2), config.trustees[0].acknowledged_distribution_version);

    // A share from the first distribution arriving late is ignored
    let stale = old_shares
        .first()
        .ok_or_else(|| anyhow!("no share sent to alice"))?;
    assert_eq!(EventOutcome::Dropped, alice.replay(stale).await);
    let held = alice
        .recovery
        .held_shares()
        .get(&vault_id)
        .await?
        .ok_or_else(|| anyhow!("share not held"))?;
    assert_eq!(2, held.distribution_version);

    Ok(())
}

/// Changing the threshold increments the distribution version,
/// renaming the vault does not.
#[tokio::test]
async fn backup_merge_threshold() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let carol = network.participant("carol");

    let vault_id =
        crate::test_utils::create_vault(&owner, &[&alice, &bob, &carol], 2)
            .await?;
    distribute_and_sync(&owner, &[&alice, &bob, &carol], &vault_id).await?;

    let config = owner
        .recovery
        .configurations()
        .merge(
            &vault_id,
            ConfigurationUpdate {
                vault_name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(1, config.distribution_version);
    assert_eq!(3, config.holding_count());

    let config = owner
        .recovery
        .configurations()
        .merge(
            &vault_id,
            ConfigurationUpdate {
                threshold: Some(3),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(2, config.distribution_version);
    assert_eq!(0, config.holding_count());

    // Thresholds above the trustee count are rejected
    let result = owner
        .recovery
        .configurations()
        .merge(
            &vault_id,
            ConfigurationUpdate {
                threshold: Some(4),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(keyward_recovery::Error::InvalidThreshold { .. })
    ));

    Ok(())
}
