//! Distribute shares to trustees and track their confirmations.
use crate::{
    configuration::ShardReport, BackupConfiguration,
    BackupConfigurationStore, BackupStatus, DeliveryOutcome, DeliveryResult,
    Error, EventOutcome, HeldShare, HeldShareStore, Notification, Notifier,
    Result, SharedIdentity,
};
use futures::future::join_all;
use keyward_core::{EventId, PublicKey, RelaySet, UtcDateTime, VaultId};
use keyward_protocol::{
    encode_event, BoxedTransport, InboundEvent, Payload,
    ShardConfirmationPayload, ShardErrorPayload, ShardPayload,
};
use keyward_shamir::{SecretSplitter, ShareRecord, PRIME_MODULUS};
use std::sync::Arc;

/// Sends shares to trustees.
pub struct ShardDistributor {
    identity: SharedIdentity,
    transport: BoxedTransport,
    configurations: Arc<BackupConfigurationStore>,
    held_shares: Arc<HeldShareStore>,
    notifier: Notifier,
}

impl ShardDistributor {
    /// Create a share distributor.
    pub fn new(
        identity: SharedIdentity,
        transport: BoxedTransport,
        configurations: Arc<BackupConfigurationStore>,
        held_shares: Arc<HeldShareStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            identity,
            transport,
            configurations,
            held_shares,
            notifier,
        }
    }

    /// Split a secret using the threshold of the vault
    /// configuration and distribute the shares.
    ///
    /// Every call makes a new split. Calling again after shares
    /// went out increments the distribution version so trustees
    /// missed by the new split keep an older version.
    pub async fn distribute_secret(
        &self,
        vault_id: &VaultId,
        secret: &[u8],
    ) -> Result<Vec<DeliveryResult>> {
        let current = self.configurations.require(vault_id).await?;
        if self.identity.public_key() != current.owner {
            return Err(Error::NotVaultOwner(*vault_id));
        }
        if current.status != BackupStatus::Active {
            return Err(Error::ConfigurationNotActive(*vault_id));
        }
        let splitter = SecretSplitter::new(
            current.vault_id,
            current.owner.clone(),
            current.relays.clone(),
        );
        let shares = splitter.split(secret, current.threshold, current.total_keys)?;

        let config = self.configurations.prepare_split(vault_id).await?;
        self.distribute(&config, shares).await
    }

    /// Send share `i` to trustee `i`.
    ///
    /// Trustees without a public key are skipped. A failed send
    /// does not affect the other trustees; every outcome is
    /// recorded on the configuration and returned.
    pub async fn distribute(
        &self,
        config: &BackupConfiguration,
        shares: Vec<ShareRecord>,
    ) -> Result<Vec<DeliveryResult>> {
        if shares.len() != config.total_keys as usize
            || shares.len() != config.trustees.len()
        {
            return Err(Error::ShareCountMismatch {
                expected: config.total_keys,
                actual: shares.len(),
            });
        }
        if self.identity.public_key() != config.owner {
            return Err(Error::NotVaultOwner(config.vault_id));
        }

        let keys: Vec<PublicKey> = config
            .trustees
            .iter()
            .filter_map(|t| t.public_key.clone())
            .collect();

        let sends = config.trustees.iter().zip(shares).map(|(trustee, share)| {
            let keys = &keys;
            async move {
                let shard_index = share.share_index;
                let split_id = share.split_id;
                let outcome = match &trustee.public_key {
                    None => DeliveryOutcome::Skipped,
                    Some(recipient) => {
                        let payload = Payload::Shard(ShardPayload {
                            vault_id: config.vault_id,
                            vault_name: config.vault_name.clone(),
                            shard_index,
                            share,
                            distribution_version: config.distribution_version,
                            peers: keys
                                .iter()
                                .filter(|k| *k != recipient)
                                .cloned()
                                .collect(),
                        });
                        match self.send(recipient, &config.relays, &payload).await {
                            Ok(event_id) => DeliveryOutcome::Sent(event_id),
                            Err(e) => {
                                let message = Error::DeliveryFailed {
                                    trustee: recipient.clone(),
                                    message: e.to_string(),
                                }
                                .to_string();
                                tracing::warn!(
                                    vault_id = %config.vault_id,
                                    error = %message,
                                    "distributor::send_failed");
                                DeliveryOutcome::Failed(message)
                            }
                        }
                    }
                };
                DeliveryResult {
                    trustee_id: trustee.id,
                    public_key: trustee.public_key.clone(),
                    shard_index,
                    split_id,
                    outcome,
                }
            }
        });
        let results = join_all(sends).await;

        self.configurations
            .record_distribution(&config.vault_id, config.distribution_version, &results)
            .await?;

        tracing::debug!(
            vault_id = %config.vault_id,
            distribution_version = config.distribution_version,
            sent = results
                .iter()
                .filter(|r| matches!(r.outcome, DeliveryOutcome::Sent(_)))
                .count(),
            total = results.len(),
            "distributor::distribute");
        Ok(results)
    }

    /// Apply a confirmation from a trustee.
    pub async fn on_shard_confirmation(
        &self,
        event: &InboundEvent,
        payload: &ShardConfirmationPayload,
    ) -> EventOutcome {
        self.apply_report(
            event,
            &payload.vault_id,
            payload.shard_index,
            payload.distribution_version,
            ShardReport::Confirmed,
        )
        .await
    }

    /// Apply an error reported by a trustee.
    pub async fn on_shard_error(
        &self,
        event: &InboundEvent,
        payload: &ShardErrorPayload,
    ) -> EventOutcome {
        self.apply_report(
            event,
            &payload.vault_id,
            payload.shard_index,
            payload.distribution_version,
            ShardReport::Failed(payload.error.clone()),
        )
        .await
    }

    async fn apply_report(
        &self,
        event: &InboundEvent,
        vault_id: &VaultId,
        shard_index: u8,
        distribution_version: u64,
        report: ShardReport,
    ) -> EventOutcome {
        match self
            .configurations
            .apply_shard_report(
                vault_id,
                &event.sender,
                shard_index,
                distribution_version,
                &event.event_id,
                report,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "distributor::report_dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Store a share sent by a vault owner and confirm it.
    ///
    /// Shares that cannot be used are answered with an error event.
    pub async fn on_shard_event(
        &self,
        event: &InboundEvent,
        payload: &ShardPayload,
    ) -> EventOutcome {
        let share = &payload.share;
        if let Err(reason) = check_share(event, payload) {
            tracing::warn!(
                vault_id = %payload.vault_id,
                reason = reason,
                "distributor::unusable_share");
            let report = Payload::ShardError(ShardErrorPayload {
                vault_id: payload.vault_id,
                shard_index: payload.shard_index,
                distribution_version: payload.distribution_version,
                error: reason.to_owned(),
            });
            self.reply(&event.sender, &share.relays, &report).await;
            return EventOutcome::Dropped;
        }

        let existing = match self.held_shares.get(&payload.vault_id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(error = %e, "distributor::held_share_failed");
                return EventOutcome::Dropped;
            }
        };
        if let Some(existing) = &existing {
            if existing.source_event_id == event.event_id {
                return EventOutcome::Duplicate;
            }
            if existing.distribution_version > payload.distribution_version {
                tracing::warn!(
                    vault_id = %payload.vault_id,
                    held = existing.distribution_version,
                    received = payload.distribution_version,
                    "distributor::stale_share");
                return EventOutcome::Dropped;
            }
        }

        let received_at = UtcDateTime::now();
        let mut share = share.clone();
        share.received_at = Some(received_at);
        let held = HeldShare {
            vault_id: payload.vault_id,
            vault_name: payload.vault_name.clone(),
            owner: event.sender.clone(),
            share,
            distribution_version: payload.distribution_version,
            peers: payload.peers.clone(),
            received_at,
            source_event_id: event.event_id.clone(),
        };
        if let Err(e) = self.held_shares.put(&held).await {
            tracing::warn!(error = %e, "distributor::held_share_failed");
            let report = Payload::ShardError(ShardErrorPayload {
                vault_id: payload.vault_id,
                shard_index: payload.shard_index,
                distribution_version: payload.distribution_version,
                error: e.to_string(),
            });
            self.reply(&event.sender, &held.share.relays, &report).await;
            return EventOutcome::Dropped;
        }

        self.notifier.notify(Notification::ShareReceived {
            vault_id: payload.vault_id,
            owner: event.sender.clone(),
        });

        let confirmation = Payload::ShardConfirmation(ShardConfirmationPayload {
            vault_id: payload.vault_id,
            shard_index: payload.shard_index,
            distribution_version: payload.distribution_version,
        });
        self.reply(&event.sender, &held.share.relays, &confirmation)
            .await;

        tracing::debug!(
            vault_id = %payload.vault_id,
            shard_index = payload.shard_index,
            distribution_version = payload.distribution_version,
            "distributor::share_stored");
        EventOutcome::Applied
    }

    async fn send(
        &self,
        recipient: &PublicKey,
        relays: &RelaySet,
        payload: &Payload,
    ) -> Result<EventId> {
        let envelope = encode_event(&*self.identity, recipient, payload).await?;
        Ok(self.transport.publish(envelope, relays).await?)
    }

    async fn reply(&self, recipient: &PublicKey, relays: &RelaySet, payload: &Payload) {
        if let Err(e) = self.send(recipient, relays, payload).await {
            tracing::warn!(
                recipient = %recipient.short(),
                kind = %payload.kind(),
                error = %e,
                "distributor::reply_failed");
        }
    }
}

fn check_share(
    event: &InboundEvent,
    payload: &ShardPayload,
) -> std::result::Result<(), &'static str> {
    let share = &payload.share;
    if share.creator != event.sender {
        return Err("share creator is not the sender");
    }
    if share.vault_id != payload.vault_id {
        return Err("share belongs to another vault");
    }
    if share.share_index != payload.shard_index
        || share.share_index == 0
        || share.share_index > share.total_shares
    {
        return Err("share index mismatch");
    }
    if share.prime_modulus != PRIME_MODULUS {
        return Err("unsupported prime modulus");
    }
    if share.share_value.is_empty() {
        return Err("empty share value");
    }
    Ok(())
}
