use crate::test_utils::{
    assert::assert_trustee_statuses, create_vault, distribute_and_sync,
    relays, Network, SECRET,
};
use anyhow::Result;
use keyward_protocol::{
    encode_event, EventTransport, Payload, ShardErrorPayload, ShardPayload,
};
use keyward_recovery::{EventOutcome, TrusteeStatus};
use keyward_shamir::SecretSplitter;
use pretty_assertions::assert_eq;

/// A share that was not created by its sender is answered with
/// an error and never stored.
#[tokio::test]
async fn backup_share_from_wrong_creator() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let mallory = network.participant("mallory");

    let vault_id = uuid::Uuid::new_v4();
    let splitter = SecretSplitter::new(vault_id, owner.public_key(), relays()?);
    let mut shares = splitter.split(SECRET, 2, 2)?;
    let payload = Payload::Shard(ShardPayload {
        vault_id,
        vault_name: "Forged".to_string(),
        shard_index: 1,
        share: shares.remove(0),
        distribution_version: 1,
        peers: vec![],
    });
    let envelope =
        encode_event(&*mallory.identity, &alice.public_key(), &payload).await?;
    network.transport.publish(envelope, &relays()?).await?;

    assert_eq!(vec![EventOutcome::Dropped], alice.sync().await);
    assert!(alice.recovery.held_shares().get(&vault_id).await?.is_none());

    // Mallory is told about the problem but has no vault to update
    assert_eq!(1, mallory.inbox().await.len());
    assert_eq!(vec![EventOutcome::Dropped], mallory.sync().await);

    Ok(())
}

/// Errors reported by a trustee move them to the error state.
#[tokio::test]
async fn backup_shard_error_report() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");

    let vault_id = create_vault(&owner, &[&alice, &bob], 2).await?;
    owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, SECRET)
        .await?;

    let payload = Payload::ShardError(ShardErrorPayload {
        vault_id,
        shard_index: 1,
        distribution_version: 1,
        error: "storage full".to_string(),
    });
    let envelope =
        encode_event(&*alice.identity, &owner.public_key(), &payload).await?;
    network.transport.publish(envelope, &relays()?).await?;

    assert_eq!(vec![EventOutcome::Applied], owner.sync().await);
    let config = assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::Error, TrusteeStatus::AwaitingKey],
    )
    .await?;
    assert_eq!(Some("storage full"), config.trustees[0].last_error.as_deref());

    // Sending the share again recovers the trustee
    distribute_and_sync(&owner, &[&alice, &bob], &vault_id).await?;
    assert_trustee_statuses(
        &owner.recovery,
        &vault_id,
        &[TrusteeStatus::HoldingKey; 2],
    )
    .await?;

    Ok(())
}
