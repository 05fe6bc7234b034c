//! Backup configurations and trustee status.
//!
//! [BackupConfigurationStore] is the only writer of backup
//! configurations; the invitation manager and share distributor
//! change trustee state through it. Every read-modify-write
//! sequence holds the lock for the vault.
use crate::{
    locks::KeyedLocks, BackupConfiguration, BackupStatus,
    ConfigurationUpdate, DeliveryOutcome, DeliveryResult, Error,
    EventOutcome, HeldShareRef, Notification, Notifier, Result, Trustee,
    TrusteeStatus,
};
use keyward_core::{
    constants::MAX_TRUSTEES, Config, EventId, InviteCode, PublicKey,
    RelaySet, TrusteeId, UtcDateTime, VaultId,
};
use keyward_storage::{JsonStore, Namespace, StorageProvider, StoreKey};
use std::collections::HashSet;

/// Selects a trustee to remove.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TrusteeSelector<'a> {
    InviteCode(&'a InviteCode),
    PublicKey(&'a PublicKey),
}

/// Report about a share from a trustee.
#[derive(Debug, Clone)]
pub(crate) enum ShardReport {
    Confirmed,
    Failed(String),
}

/// Persists backup configurations.
pub struct BackupConfigurationStore {
    store: StorageProvider,
    locks: KeyedLocks<VaultId>,
    notifier: Notifier,
    event_history: usize,
}

impl BackupConfigurationStore {
    /// Create a configuration store.
    pub fn new(store: StorageProvider, notifier: Notifier, config: &Config) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            notifier,
            event_history: config.event_history.max(1),
        }
    }

    fn key(vault_id: &VaultId) -> Result<StoreKey> {
        Ok(StoreKey::new(Namespace::BackupConfiguration, vault_id)?)
    }

    async fn read(&self, vault_id: &VaultId) -> Result<Option<BackupConfiguration>> {
        Ok(self.store.read_json(&Self::key(vault_id)?).await?)
    }

    async fn read_required(&self, vault_id: &VaultId) -> Result<BackupConfiguration> {
        self.read(vault_id)
            .await?
            .ok_or(Error::VaultNotFound(*vault_id))
    }

    async fn write(&self, config: &mut BackupConfiguration) -> Result<()> {
        config.last_updated = UtcDateTime::now();
        self.store
            .write_json(&Self::key(&config.vault_id)?, config)
            .await?;
        self.notifier.notify(Notification::ConfigurationChanged {
            vault_id: config.vault_id,
            distribution_version: config.distribution_version,
        });
        Ok(())
    }

    fn notify_status(&self, vault_id: &VaultId, trustee: &Trustee) {
        self.notifier.notify(Notification::TrusteeStatusChanged {
            vault_id: *vault_id,
            trustee_id: trustee.id,
            status: trustee.status,
        });
    }

    /// Create an active configuration.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        owner: PublicKey,
        vault_id: VaultId,
        vault_name: String,
        threshold: u8,
        total_keys: u8,
        trustees: Vec<Trustee>,
        relays: RelaySet,
    ) -> Result<BackupConfiguration> {
        let now = UtcDateTime::now();
        let mut config = BackupConfiguration {
            vault_id,
            vault_name,
            owner,
            threshold,
            total_keys,
            trustees,
            relays,
            instructions: None,
            distribution_version: 1,
            status: BackupStatus::Active,
            created_at: now,
            last_updated: now,
            last_redistribution: None,
            processed_events: Vec::new(),
        };
        config.validate()?;

        let _guard = self.locks.lock(&vault_id).await;
        if self.read(&vault_id).await?.is_some() {
            return Err(Error::ConfigurationExists(vault_id));
        }
        self.write(&mut config).await?;

        tracing::debug!(
            vault_id = %vault_id,
            threshold = threshold,
            total_keys = total_keys,
            "configuration::create");
        Ok(config)
    }

    /// Configuration for a vault.
    pub async fn get(&self, vault_id: &VaultId) -> Result<Option<BackupConfiguration>> {
        self.read(vault_id).await
    }

    /// Configuration for a vault, an error if it does not exist.
    pub async fn require(&self, vault_id: &VaultId) -> Result<BackupConfiguration> {
        self.read_required(vault_id).await
    }

    /// All configurations.
    pub async fn list(&self) -> Result<Vec<BackupConfiguration>> {
        Ok(self
            .store
            .read_all_json(Namespace::BackupConfiguration)
            .await?)
    }

    /// Finalize a draft configuration with a threshold.
    pub async fn activate(
        &self,
        vault_id: &VaultId,
        threshold: u8,
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        config.threshold = threshold;
        config.status = BackupStatus::Active;
        config.sync_total();
        config.validate()?;
        self.write(&mut config).await?;

        tracing::debug!(
            vault_id = %vault_id,
            threshold = threshold,
            total_keys = config.total_keys,
            "configuration::activate");
        Ok(config)
    }

    /// Apply changes to a configuration.
    ///
    /// Trustees are matched by id; retained trustees keep their
    /// status and acknowledgment. Adding or removing a trustee or
    /// changing the threshold increments the distribution version.
    pub async fn merge(
        &self,
        vault_id: &VaultId,
        update: ConfigurationUpdate,
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        let current = self.read_required(vault_id).await?;
        let mut next = current.clone();
        let mut bump = false;

        if let Some(vault_name) = update.vault_name {
            next.vault_name = vault_name;
        }
        if let Some(relays) = update.relays {
            next.relays = relays;
        }
        if let Some(instructions) = update.instructions {
            next.instructions = Some(instructions);
        }
        if let Some(threshold) = update.threshold {
            bump |= threshold != current.threshold;
            next.threshold = threshold;
        }
        if let Some(trustees) = update.trustees {
            next.trustees = merge_trustees(&current.trustees, trustees);
            let before: HashSet<TrusteeId> =
                current.trustees.iter().map(|t| t.id).collect();
            let after: HashSet<TrusteeId> =
                next.trustees.iter().map(|t| t.id).collect();
            bump |= before != after;
            next.sync_total();
        }

        match next.status {
            BackupStatus::Active => next.validate()?,
            BackupStatus::Draft => next.validate_keys()?,
        }

        if bump {
            next.bump_version();
        }
        self.write(&mut next).await?;

        tracing::debug!(
            vault_id = %vault_id,
            distribution_version = next.distribution_version,
            bumped = bump,
            "configuration::merge");
        Ok(next)
    }

    /// Record that the protected secret changed.
    ///
    /// Increments the distribution version so every trustee
    /// waits for a new share.
    pub async fn handle_content_change(
        &self,
        vault_id: &VaultId,
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        config.bump_version();
        self.write(&mut config).await?;
        for trustee in &config.trustees {
            self.notify_status(vault_id, trustee);
        }

        tracing::debug!(
            vault_id = %vault_id,
            distribution_version = config.distribution_version,
            "configuration::content_change");
        Ok(config)
    }

    /// Configuration to split a new secret for.
    ///
    /// Shares from two splits never share a distribution version:
    /// when shares were already sent for the current version it is
    /// incremented before the new split goes out.
    pub(crate) async fn prepare_split(
        &self,
        vault_id: &VaultId,
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        if config.status != BackupStatus::Active {
            return Err(Error::ConfigurationNotActive(*vault_id));
        }
        let current = config.distribution_version;
        let distributed = config.trustees.iter().any(|t| {
            t.held_share
                .is_some_and(|held| held.distribution_version == current)
        });
        if distributed {
            config.bump_version();
            self.write(&mut config).await?;
            for trustee in &config.trustees {
                self.notify_status(vault_id, trustee);
            }
            tracing::debug!(
                vault_id = %vault_id,
                distribution_version = config.distribution_version,
                "configuration::new_split");
        }
        Ok(config)
    }

    /// Configuration for a vault owned by `owner`, created as a
    /// draft when missing.
    pub(crate) async fn ensure_draft(
        &self,
        owner: &PublicKey,
        vault_id: &VaultId,
        vault_name: &str,
        relays: &RelaySet,
        threshold: u8,
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        if let Some(config) = self.read(vault_id).await? {
            if &config.owner != owner {
                return Err(Error::NotVaultOwner(*vault_id));
            }
            return Ok(config);
        }

        let now = UtcDateTime::now();
        let mut config = BackupConfiguration {
            vault_id: *vault_id,
            vault_name: vault_name.to_owned(),
            owner: owner.clone(),
            threshold,
            total_keys: 0,
            trustees: Vec::new(),
            relays: relays.clone(),
            instructions: None,
            distribution_version: 1,
            status: BackupStatus::Draft,
            created_at: now,
            last_updated: now,
            last_redistribution: None,
            processed_events: Vec::new(),
        };
        self.write(&mut config).await?;
        tracing::debug!(vault_id = %vault_id, "configuration::draft");
        Ok(config)
    }

    /// Add a placeholder trustee for an invitation.
    pub(crate) async fn add_placeholder(
        &self,
        vault_id: &VaultId,
        name: &str,
        invite_code: &InviteCode,
    ) -> Result<Trustee> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        if let Some(existing) = config.trustee_by_code(invite_code) {
            return Ok(existing.clone());
        }
        check_capacity(&config)?;

        let trustee = Trustee::new_invited(name, invite_code.clone());
        config.trustees.push(trustee.clone());
        config.sync_total();
        self.write(&mut config).await?;
        self.notify_status(vault_id, &trustee);
        Ok(trustee)
    }

    /// Assign the key of an invitee.
    ///
    /// The placeholder created for the invitation is updated in
    /// place; when there is no placeholder the invitee is appended
    /// and the distribution version incremented.
    pub(crate) async fn accept_invitation(
        &self,
        vault_id: &VaultId,
        invite_code: &InviteCode,
        public_key: &PublicKey,
        name: Option<&str>,
    ) -> Result<Trustee> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        if &config.owner == public_key {
            return Err(Error::SelfInvitationRejected);
        }
        if let Some(existing) = config.trustee_by_key(public_key) {
            if existing.invite_code.as_ref() == Some(invite_code) {
                return Ok(existing.clone());
            }
            return Err(Error::DuplicateTrustee(public_key.clone()));
        }

        let placeholder = config.trustees.iter_mut().find(|t| {
            t.is_placeholder() && t.invite_code.as_ref() == Some(invite_code)
        });
        let trustee = if let Some(trustee) = placeholder {
            trustee.public_key = Some(public_key.clone());
            trustee.status = TrusteeStatus::AwaitingKey;
            if let Some(name) = name {
                trustee.name = name.to_owned();
            }
            trustee.clone()
        } else {
            check_capacity(&config)?;
            let mut trustee = Trustee::new_with_key(
                name.unwrap_or(invite_code.as_str()),
                public_key.clone(),
            );
            trustee.invite_code = Some(invite_code.clone());
            config.trustees.push(trustee.clone());
            config.sync_total();
            config.bump_version();
            trustee
        };

        self.write(&mut config).await?;
        self.notify_status(vault_id, &trustee);

        tracing::debug!(
            vault_id = %vault_id,
            trustee = %public_key.short(),
            distribution_version = config.distribution_version,
            "configuration::accept_invitation");
        Ok(trustee)
    }

    /// Remove a trustee.
    ///
    /// Removing a trustee with a public key increments the
    /// distribution version. An active configuration left with
    /// fewer trustees than its threshold returns to draft until
    /// it is activated again.
    pub(crate) async fn remove_trustee(
        &self,
        vault_id: &VaultId,
        selector: TrusteeSelector<'_>,
    ) -> Result<Option<Trustee>> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        let position = config.trustees.iter().position(|t| match selector {
            TrusteeSelector::InviteCode(code) => t.invite_code.as_ref() == Some(code),
            TrusteeSelector::PublicKey(key) => t.public_key.as_ref() == Some(key),
        });
        let Some(position) = position else {
            return Ok(None);
        };

        let removed = config.trustees.remove(position);
        config.sync_total();
        if !removed.is_placeholder() {
            config.bump_version();
        }
        if config.status == BackupStatus::Active
            && config.threshold > config.total_keys
        {
            config.status = BackupStatus::Draft;
            tracing::warn!(
                vault_id = %vault_id,
                threshold = config.threshold,
                total_keys = config.total_keys,
                "configuration::below_threshold");
        }
        self.write(&mut config).await?;

        tracing::debug!(
            vault_id = %vault_id,
            trustee_id = %removed.id,
            distribution_version = config.distribution_version,
            status = ?config.status,
            "configuration::remove_trustee");
        Ok(Some(removed))
    }

    /// Record the results of a share distribution.
    ///
    /// Results for an outdated distribution version are ignored.
    pub(crate) async fn record_distribution(
        &self,
        vault_id: &VaultId,
        distribution_version: u64,
        results: &[DeliveryResult],
    ) -> Result<BackupConfiguration> {
        let _guard = self.locks.lock(vault_id).await;
        let mut config = self.read_required(vault_id).await?;
        if config.distribution_version != distribution_version {
            tracing::warn!(
                vault_id = %vault_id,
                current = config.distribution_version,
                distributed = distribution_version,
                "configuration::stale_distribution");
            return Ok(config);
        }

        let mut changed = Vec::new();
        for result in results {
            let Some(trustee) =
                config.trustees.iter_mut().find(|t| t.id == result.trustee_id)
            else {
                continue;
            };
            match &result.outcome {
                DeliveryOutcome::Sent(_) => {
                    trustee.held_share = Some(HeldShareRef {
                        shard_index: result.shard_index,
                        split_id: result.split_id,
                        distribution_version,
                    });
                    trustee.status = match trustee.status {
                        TrusteeStatus::HoldingKey => TrusteeStatus::AwaitingNewKey,
                        TrusteeStatus::Error => trustee
                            .previous_status
                            .take()
                            .unwrap_or(TrusteeStatus::AwaitingKey),
                        status => status,
                    };
                    trustee.last_error = None;
                }
                DeliveryOutcome::Failed(message) => {
                    trustee.set_error(message.clone());
                }
                DeliveryOutcome::Skipped => continue,
            }
            changed.push(trustee.clone());
        }

        if results
            .iter()
            .any(|r| matches!(r.outcome, DeliveryOutcome::Sent(_)))
        {
            config.last_redistribution = Some(UtcDateTime::now());
        }
        self.write(&mut config).await?;
        for trustee in &changed {
            self.notify_status(vault_id, trustee);
        }
        Ok(config)
    }

    /// Apply a confirmation or error reported by a trustee.
    ///
    /// The report must come from a trustee of the vault and match
    /// the share index and distribution version last sent to it.
    pub(crate) async fn apply_shard_report(
        &self,
        vault_id: &VaultId,
        sender: &PublicKey,
        shard_index: u8,
        distribution_version: u64,
        event_id: &EventId,
        report: ShardReport,
    ) -> Result<EventOutcome> {
        let _guard = self.locks.lock(vault_id).await;
        let Some(mut config) = self.read(vault_id).await? else {
            tracing::warn!(vault_id = %vault_id, "configuration::unknown_vault");
            return Ok(EventOutcome::Dropped);
        };

        if config.has_processed(event_id) {
            tracing::debug!(event_id = %event_id, "configuration::duplicate_event");
            return Ok(EventOutcome::Duplicate);
        }

        let current_version = config.distribution_version;
        let Some(trustee) = config
            .trustees
            .iter_mut()
            .find(|t| t.public_key.as_ref() == Some(sender))
        else {
            tracing::warn!(
                vault_id = %vault_id,
                sender = %sender.short(),
                "configuration::unknown_trustee");
            return Ok(EventOutcome::Dropped);
        };

        let matches_share = trustee.held_share.is_some_and(|held| {
            held.shard_index == shard_index
                && held.distribution_version == distribution_version
        });
        if distribution_version != current_version || !matches_share {
            tracing::warn!(
                vault_id = %vault_id,
                sender = %sender.short(),
                shard_index = shard_index,
                distribution_version = distribution_version,
                current_version = current_version,
                "configuration::stale_shard_report");
            return Ok(EventOutcome::Dropped);
        }

        let outcome = match report {
            ShardReport::Confirmed => {
                if trustee.status == TrusteeStatus::HoldingKey
                    && trustee.acknowledged_distribution_version
                        == Some(distribution_version)
                {
                    EventOutcome::Duplicate
                } else {
                    trustee.status = TrusteeStatus::HoldingKey;
                    trustee.acknowledged_at = Some(UtcDateTime::now());
                    trustee.acknowledgment_event_id = Some(event_id.clone());
                    trustee.acknowledged_distribution_version =
                        Some(distribution_version);
                    trustee.last_error = None;
                    trustee.previous_status = None;
                    EventOutcome::Applied
                }
            }
            ShardReport::Failed(message) => {
                trustee.set_error(message);
                EventOutcome::Applied
            }
        };

        let trustee = trustee.clone();
        config.remember_event(event_id.clone(), self.event_history);
        self.write(&mut config).await?;
        if outcome == EventOutcome::Applied {
            self.notify_status(vault_id, &trustee);
        }

        tracing::debug!(
            vault_id = %vault_id,
            trustee = %sender.short(),
            status = %trustee.status,
            "configuration::shard_report");
        Ok(outcome)
    }
}

fn check_capacity(config: &BackupConfiguration) -> Result<()> {
    if config.trustees.len() >= MAX_TRUSTEES as usize {
        return Err(Error::InvalidThreshold {
            threshold: config.threshold,
            total: config.trustees.len() + 1,
            max: MAX_TRUSTEES,
        });
    }
    Ok(())
}

fn merge_trustees(existing: &[Trustee], incoming: Vec<Trustee>) -> Vec<Trustee> {
    incoming
        .into_iter()
        .map(|update| match existing.iter().find(|t| t.id == update.id) {
            Some(current) => {
                let mut trustee = current.clone();
                trustee.name = update.name;
                if trustee.public_key.is_none() && update.public_key.is_some() {
                    trustee.public_key = update.public_key;
                    trustee.status = TrusteeStatus::AwaitingKey;
                }
                if trustee.invite_code.is_none() {
                    trustee.invite_code = update.invite_code;
                }
                trustee
            }
            None => {
                let status = match update.public_key {
                    Some(_) => TrusteeStatus::AwaitingKey,
                    None => TrusteeStatus::Invited,
                };
                let mut trustee = Trustee::new(
                    update.name,
                    update.public_key,
                    update.invite_code,
                    status,
                );
                trustee.id = update.id;
                trustee
            }
        })
        .collect()
}
