//! Assertions shared by the integration tests.
use anyhow::{anyhow, Result};
use keyward_core::VaultId;
use keyward_recovery::{BackupConfiguration, SocialRecovery, TrusteeStatus};
use pretty_assertions::assert_eq;

/// Assert the status of every trustee of a vault in share order.
pub async fn assert_trustee_statuses(
    recovery: &SocialRecovery,
    vault_id: &VaultId,
    expected: &[TrusteeStatus],
) -> Result<BackupConfiguration> {
    let config = recovery
        .configurations()
        .get(vault_id)
        .await?
        .ok_or_else(|| anyhow!("no configuration for {}", vault_id))?;
    let statuses: Vec<TrusteeStatus> =
        config.trustees.iter().map(|t| t.status).collect();
    assert_eq!(expected, statuses.as_slice());
    Ok(config)
}
