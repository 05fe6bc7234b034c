use crate::RecoveryFixture;
use anyhow::Result;
use keyward_core::VaultId;
use keyward_recovery::{Error, RecoveryStatus};
use pretty_assertions::assert_eq;

/// Only one active request per vault for an initiator.
#[tokio::test]
async fn recovery_duplicate_active_request() -> Result<()> {
    //crate::test_utils::init_tracing();

    let fixture = RecoveryFixture::new().await?;
    let coordinator = fixture.device.recovery.coordinator();

    let first = coordinator
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await?;
    let result = coordinator
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await;
    match result {
        Err(Error::DuplicateActiveRequest {
            vault_id,
            request_id,
        }) => {
            assert_eq!(fixture.vault_id, vault_id);
            assert_eq!(first.id, request_id);
        }
        other => panic!("expected duplicate request error, got {:?}", other),
    }

    // Other vaults are not affected
    let other = coordinator
        .initiate_recovery(VaultId::new_v4(), fixture.trustee_keys(), 2, None, None)
        .await?;
    assert_eq!(RecoveryStatus::Sent, other.status);

    coordinator.cancel_recovery_request(&first.id).await?;
    let second = coordinator
        .initiate_recovery(fixture.vault_id, fixture.trustee_keys(), 2, None, None)
        .await?;
    assert_ne!(first.id, second.id);
    assert_eq!(3, coordinator.list().await?.len());

    // Trustees receive every request
    let alice = &fixture.trustees[0];
    alice.sync().await;
    assert_eq!(3, alice.recovery.coordinator().list_incoming().await?.len());

    Ok(())
}

/// Trustee lists must not repeat keys or include the initiator.
#[tokio::test]
async fn recovery_duplicate_trustee() -> Result<()> {
    //crate::test_utils::init_tracing();

    let fixture = RecoveryFixture::new().await?;
    let coordinator = fixture.device.recovery.coordinator();

    let mut trustees = fixture.trustee_keys();
    trustees.push(trustees[0].clone());
    let result = coordinator
        .initiate_recovery(fixture.vault_id, trustees, 2, None, None)
        .await;
    assert!(matches!(result, Err(Error::DuplicateTrustee(_))));

    let mut trustees = fixture.trustee_keys();
    trustees.push(fixture.device.public_key());
    let result = coordinator
        .initiate_recovery(fixture.vault_id, trustees, 2, None, None)
        .await;
    assert!(matches!(result, Err(Error::DuplicateTrustee(_))));

    assert!(coordinator.list().await?.is_empty());

    Ok(())
}
