use crate::{
    test_utils::{create_vault, relays, sync_all, Network, SECRET},
    RecoveryFixture,
};
use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_protocol::{
    encode_event, EventTransport, Payload, RecoveryResponsePayload,
};
use keyward_recovery::{
    secrecy::ExposeSecret, DeliveryOutcome, Error, EventOutcome,
    RecoveryStatus,
};
use keyward_shamir::SecretSplitter;
use keyward_storage::MemoryStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Trustees missed by different distributions hold shares of
/// different splits; the secret is rebuilt from the split that
/// has enough approvals.
#[tokio::test]
async fn recovery_after_partial_redistribution() -> Result<()> {
    //crate::test_utils::init_tracing();

    let network = Network::new()?;
    let owner = network.participant("owner");
    let alice = network.participant("alice");
    let bob = network.participant("bob");
    let carol = network.participant("carol");
    let everyone = [&owner, &alice, &bob, &carol];

    let vault_id = create_vault(&owner, &[&alice, &bob, &carol], 2).await?;

    network.transport.fail_recipient(bob.public_key()).await;
    let results = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, SECRET)
        .await?;
    assert!(matches!(results[1].outcome, DeliveryOutcome::Failed(_)));
    sync_all(&everyone).await;
    network.transport.restore_recipient(&bob.public_key()).await;

    network.transport.fail_recipient(alice.public_key()).await;
    let results = owner
        .recovery
        .distributor()
        .distribute_secret(&vault_id, SECRET)
        .await?;
    assert!(matches!(results[0].outcome, DeliveryOutcome::Failed(_)));
    sync_all(&everyone).await;
    network.transport.restore_recipient(&alice.public_key()).await;

    let config = owner.recovery.configurations().require(&vault_id).await?;
    assert_eq!(2, config.distribution_version);

    let mut held = Vec::new();
    for trustee in [&alice, &bob, &carol] {
        held.push(
            trustee
                .recovery
                .held_shares()
                .get(&vault_id)
                .await?
                .ok_or_else(|| anyhow!("share not held by {}", trustee.name))?,
        );
    }
    assert_eq!(1, held[0].distribution_version);
    assert_eq!(2, held[1].distribution_version);
    assert_eq!(2, held[2].distribution_version);
    assert_ne!(held[0].share.split_id, held[1].share.split_id);
    assert_eq!(held[1].share.split_id, held[2].share.split_id);

    let device = network.participant_with_identity(
        "device",
        Arc::clone(&owner.identity),
        Arc::new(MemoryStore::new()),
    );
    device.sync().await;
    let coordinator = device.recovery.coordinator();
    let request = coordinator
        .initiate_recovery(
            vault_id,
            vec![alice.public_key(), bob.public_key(), carol.public_key()],
            2,
            None,
            None,
        )
        .await?;

    for trustee in [&alice, &bob] {
        trustee.sync().await;
        trustee
            .recovery
            .coordinator()
            .answer_recovery_request(&request.id, true)
            .await?;
    }
    assert_eq!(
        vec![EventOutcome::Applied, EventOutcome::Applied],
        device.sync().await
    );

    // Two approvals from two different splits
    let progress = coordinator.get_recovery_status(&request.id).await?;
    assert_eq!(RecoveryStatus::InProgress, progress.status);
    assert_eq!(2, progress.approved_count);
    assert!(!progress.can_recover);
    let result = coordinator.perform_recovery(&request.id).await;
    assert!(matches!(
        result,
        Err(Error::InsufficientApprovals {
            required: 2,
            approved: 2
        })
    ));

    carol.sync().await;
    carol
        .recovery
        .coordinator()
        .answer_recovery_request(&request.id, true)
        .await?;
    assert_eq!(vec![EventOutcome::Applied], device.sync().await);

    let progress = coordinator.get_recovery_status(&request.id).await?;
    assert_eq!(RecoveryStatus::Completed, progress.status);
    assert!(progress.can_recover);
    let secret = coordinator.perform_recovery(&request.id).await?;
    assert_eq!(SECRET, secret.expose_secret().as_slice());

    Ok(())
}

/// Approvals must carry a share.
#[tokio::test]
async fn recovery_approval_requires_share() -> Result<()> {
    //crate::test_utils::init_tracing();

    let fixture = RecoveryFixture::new().await?;
    let device = &fixture.device;
    let coordinator = device.recovery.coordinator();
    let [alice, bob] = [&fixture.trustees[0], &fixture.trustees[1]];

    let request = coordinator
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await?;

    let result = coordinator
        .respond_to_recovery_request(
            &request.id,
            &alice.public_key(),
            true,
            None,
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::ApprovalWithoutShare(_))));

    // The same through an event from Bob
    let payload = Payload::RecoveryResponse(RecoveryResponsePayload {
        recovery_request_id: request.id,
        vault_id: fixture.vault_id,
        responder_public_key: bob.public_key(),
        approved: true,
        share_record: None,
    });
    let envelope =
        encode_event(&*bob.identity, &device.public_key(), &payload).await?;
    fixture.network.transport.publish(envelope, &relays()?).await?;
    assert_eq!(vec![EventOutcome::Dropped], device.sync().await);

    let progress = coordinator.get_recovery_status(&request.id).await?;
    assert_eq!(RecoveryStatus::Sent, progress.status);
    assert_eq!(0, progress.responded_count);
    assert!(!progress.can_recover);

    // A denial needs no share
    let progress = coordinator
        .respond_to_recovery_request(
            &request.id,
            &alice.public_key(),
            false,
            None,
            None,
        )
        .await?;
    assert_eq!(1, progress.denied_count);
    assert_eq!(RecoveryStatus::InProgress, progress.status);

    Ok(())
}

/// Shares of another vault or owner are rejected and leave the
/// trustee free to answer again.
#[tokio::test]
async fn recovery_rejects_foreign_share() -> Result<()> {
    //crate::test_utils::init_tracing();

    let fixture = RecoveryFixture::new().await?;
    let coordinator = fixture.device.recovery.coordinator();
    let alice = &fixture.trustees[0];

    let request = coordinator
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await?;
    let held = alice
        .recovery
        .held_shares()
        .get(&fixture.vault_id)
        .await?
        .ok_or_else(|| anyhow!("share not held"))?;

    let mut other_vault = held.share.clone();
    other_vault.vault_id = VaultId::new_v4();
    let result = coordinator
        .respond_to_recovery_request(
            &request.id,
            &alice.public_key(),
            true,
            Some(other_vault),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::IncompatibleShare(_))));

    let stranger = fixture.network.participant("stranger");
    let splitter = SecretSplitter::new(
        fixture.vault_id,
        stranger.public_key(),
        relays()?,
    );
    let forged = splitter.split(SECRET, 2, 3)?.remove(0);
    let result = coordinator
        .respond_to_recovery_request(
            &request.id,
            &alice.public_key(),
            true,
            Some(forged),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::IncompatibleShare(_))));

    let progress = coordinator.get_recovery_status(&request.id).await?;
    assert_eq!(0, progress.responded_count);

    let progress = coordinator
        .respond_to_recovery_request(
            &request.id,
            &alice.public_key(),
            true,
            Some(held.share),
            None,
        )
        .await?;
    assert_eq!(1, progress.approved_count);

    Ok(())
}

/// A trustee answers a recovery request once.
#[tokio::test]
async fn recovery_answer_once() -> Result<()> {
    //crate::test_utils::init_tracing();

    let fixture = RecoveryFixture::new().await?;
    let device = &fixture.device;
    let alice = &fixture.trustees[0];

    let request = device
        .recovery
        .coordinator()
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await?;
    alice.sync().await;
    alice
        .recovery
        .coordinator()
        .answer_recovery_request(&request.id, true)
        .await?;
    let published = fixture.network.transport.events().await.len();

    let result = alice
        .recovery
        .coordinator()
        .answer_recovery_request(&request.id, false)
        .await;
    assert!(matches!(result, Err(Error::RecoveryAlreadyAnswered(_))));
    assert_eq!(published, fixture.network.transport.events().await.len());

    let incoming = alice.recovery.coordinator().list_incoming().await?;
    assert_eq!(Some(true), incoming[0].approved);

    Ok(())
}
