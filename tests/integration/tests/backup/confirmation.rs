use crate::test_utils::{
    assert::assert_trustee_statuses, create_vault, distribute_and_sync,
    relays, sync_all, Network, SECRET,
};
use anyhow::{anyhow, Result};
use keyward_protocol::{
    encode_event, EventTransport, Payload, ShardConfirmationPayload,
};
use keyward_recovery::{DeliveryOutcome, EventOutcome, TrusteeStatus};
use pretty_assertions::assert_eq;

/// Duplicate confirmations move a trustee to holding the key
/// exactly once.
#[tokio::test]
async fn backup_confirmation_applied_once() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let carol = network.participant("carol");

    let vault_id = create_vault(&owner, &[&alice, &bob, &carol], 2).await?;

    let results = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, SECRET)
        .await?;
    assert_eq!(3, results.len());
    assert!(results
        .iter()
        .all(|r| matches!(r.outcome, DeliveryOutcome::Sent(_))));
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::AwaitingKey; 3],
    )
    .await?;

    // Only Bob confirms for now
    assert_eq!(vec![EventOutcome::Applied], bob.sync().await);
    assert_eq!(vec![EventOutcome::Applied], owner.sync().await);
    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[
            TrusteeStatus::AwaitingKey,
            TrusteeStatus::HoldingKey,
            TrusteeStatus::AwaitingKey,
        ],
    )
    .await?;

    let trustee = config
        .trustee_by_key(&bob.public_key())
        .ok_or_else(|| anyhow!("bob is not a trustee"))?;
    assert_eq!(Some(1), trustee.acknowledged_distribution_version);
    assert!(trustee.acknowledged_at.is_some());
    let acknowledgment = trustee
        .acknowledgment_event_id
        .clone()
        .ok_or_else(|| anyhow!("no acknowledgment event"))?;

    // Deliver the same confirmation again
    let confirmation = owner
        .inbox()
        .await
        .into_iter()
        .find(|e| e.event_id == acknowledgment)
        .ok_or_else(|| anyhow!("confirmation not published"))?;
    assert_eq!(EventOutcome::Duplicate, owner.replay(&confirmation).await);
    let after = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(config, after);

    sync_all(&[&alice, &carol, &owner]).await;
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 3],
    )
    .await?;

    for (index, trustee) in [&alice, &bob, &carol].iter().enumerate() {
        let held = trustee
            .recovery
            .held_shares()
            .get(&vault_id)
            .await?
            .ok_or_else(|| anyhow!("share not held by {}", trustee.name))?;
        assert_eq!(index as u8 + 1, held.share.share_index);
        assert_eq!(owner.public_key(), held.owner);
        assert_eq!(2, held.peers.len());
        assert!(!held.peers.contains(&trustee.public_key()));
    }

    // Replacement shares come from a new split and version
    let results =
        distribute_and_sync(&owner, &[&alice, &bob, &carol], &vault_id).await?;
    assert_eq!(3, results.len());
    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 3],
    )
    .await?;
    assert_eq!(2, config.distribution_version);
    assert!(config
        .trustees
        .iter()
        .all(|t| t.acknowledged_distribution_version == Some(2)));

    Ok(())
}

/// Confirmations from keys that are not trustees are dropped.
#[tokio::test]
async fn backup_confirmation_from_stranger() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let mallory = network.participant("mallory");

    let vault_id = create_vault(&owner, &[&alice, &bob], 2).await?;
    distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;

    // Mallory claims to hold Alice's share
    let held = alice
        .recovery
        .held_shares()
        .get(&vault_id)
        .await?
        .ok_or_else(|| anyhow!("share not held"))?;
    let payload = Payload::ShardConfirmation(ShardConfirmationPayload {
        vault_id,
        shard_index: held.share.share_index,
        distribution_version: held.distribution_version,
    });
    let envelope =
        encode_event(&*mallory.identity, &owner.public_key(), &payload).await?;
    network.transport.publish(envelope, &relays()?).await?;

    assert_eq!(vec![EventOutcome::Dropped], owner.sync().await);
    Ok(())
}
