//! Invitations for trustees.
//!
//! The vault owner creates an [InvitationLink] and hands it to
//! the invitee out of band. The invitee answers with an RSVP or
//! a denial event which the owner applies with
//! [TrusteeInvitationManager::on_rsvp_event] and
//! [TrusteeInvitationManager::on_denial_event].
use crate::{
    configuration::TrusteeSelector, locks::KeyedLocks,
    BackupConfigurationStore, Error, EventOutcome, HeldShareStore,
    InvitationLink, InvitationStatus, Notification, Notifier, Result,
    SharedIdentity, Trustee,
};
use keyward_core::{
    Config, EventId, InviteCode, PublicKey, RelaySet, UtcDateTime, VaultId,
};
use keyward_protocol::{
    encode_event, BoxedTransport, DenialPayload, InboundEvent, Payload,
    RevocationPayload, RsvpPayload,
};
use keyward_storage::{
    JsonStore, Namespace, PersistentStore, StorageProvider, StoreKey,
};
use std::sync::Arc;

const DEFAULT_INVITEE_NAME: &str = "Invited trustee";

/// Creates and tracks invitations.
pub struct TrusteeInvitationManager {
    identity: SharedIdentity,
    store: StorageProvider,
    transport: BoxedTransport,
    configurations: Arc<BackupConfigurationStore>,
    held_shares: Arc<HeldShareStore>,
    notifier: Notifier,
    locks: KeyedLocks<InviteCode>,
    config: Arc<Config>,
}

impl TrusteeInvitationManager {
    /// Create an invitation manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: SharedIdentity,
        store: StorageProvider,
        transport: BoxedTransport,
        configurations: Arc<BackupConfigurationStore>,
        held_shares: Arc<HeldShareStore>,
        notifier: Notifier,
        config: Arc<Config>,
    ) -> Self {
        Self {
            identity,
            store,
            transport,
            configurations,
            held_shares,
            notifier,
            locks: KeyedLocks::new(),
            config,
        }
    }

    fn key(invite_code: &InviteCode) -> Result<StoreKey> {
        Ok(StoreKey::new(Namespace::Invitation, invite_code)?)
    }

    async fn read(&self, invite_code: &InviteCode) -> Result<Option<InvitationLink>> {
        Ok(self.store.read_json(&Self::key(invite_code)?).await?)
    }

    async fn read_required(&self, invite_code: &InviteCode) -> Result<InvitationLink> {
        self.read(invite_code)
            .await?
            .ok_or_else(|| Error::InvitationNotFound(invite_code.clone()))
    }

    async fn write(&self, link: &InvitationLink) -> Result<()> {
        self.store
            .write_json(&Self::key(&link.invite_code)?, link)
            .await?;
        self.notifier.notify(Notification::InvitationChanged {
            invite_code: link.invite_code.clone(),
            status: link.status,
        });
        Ok(())
    }

    fn parse_code(invite_code: &str) -> Result<InviteCode> {
        invite_code
            .parse()
            .map_err(|_| Error::InvalidInviteCodeFormat(invite_code.to_owned()))
    }

    fn relay_set<S: AsRef<str>>(&self, relays: &[S]) -> Result<RelaySet> {
        let relays = if relays.is_empty() {
            self.config.default_relay_set().ok_or_else(|| {
                Error::InvalidRelaySet("no relays configured".to_owned())
            })?
        } else {
            RelaySet::parse(relays)
                .map_err(|e| Error::InvalidRelaySet(e.to_string()))?
        };
        if relays.len() > self.config.relay_limit() {
            return Err(Error::InvalidRelaySet(format!(
                "at most {} relays are allowed",
                self.config.relay_limit()
            )));
        }
        Ok(relays)
    }

    /// Invitation for a code.
    pub async fn get(&self, invite_code: &InviteCode) -> Result<Option<InvitationLink>> {
        self.read(invite_code).await
    }

    /// All invitations created on this device.
    pub async fn list(&self) -> Result<Vec<InvitationLink>> {
        Ok(self.store.read_all_json(Namespace::Invitation).await?)
    }

    /// Create an invitation with a random invite code.
    ///
    /// When `relays` is empty the configured default relays are used.
    pub async fn generate_invitation_link<S: AsRef<str>>(
        &self,
        vault_id: VaultId,
        vault_name: &str,
        invitee_name: Option<String>,
        relays: &[S],
    ) -> Result<InvitationLink> {
        let invite_code = InviteCode::new_random(self.config.invite_code_bytes);
        self.create_link(vault_id, vault_name, invitee_name, relays, invite_code)
            .await
    }

    /// Create an invitation with a chosen invite code.
    pub async fn issue_invitation<S: AsRef<str>>(
        &self,
        vault_id: VaultId,
        vault_name: &str,
        invitee_name: Option<String>,
        relays: &[S],
        invite_code: &str,
    ) -> Result<InvitationLink> {
        let invite_code = Self::parse_code(invite_code)?;
        self.create_link(vault_id, vault_name, invitee_name, relays, invite_code)
            .await
    }

    async fn create_link<S: AsRef<str>>(
        &self,
        vault_id: VaultId,
        vault_name: &str,
        invitee_name: Option<String>,
        relays: &[S],
        invite_code: InviteCode,
    ) -> Result<InvitationLink> {
        let relays = self.relay_set(relays)?;
        let owner = self.identity.public_key();

        let _guard = self.locks.lock(&invite_code).await;
        if self.read(&invite_code).await?.is_some() {
            return Err(Error::InvitationExists(invite_code));
        }

        self.configurations
            .ensure_draft(
                &owner,
                &vault_id,
                vault_name,
                &relays,
                self.config.default_threshold,
            )
            .await?;

        let link = InvitationLink {
            invite_code,
            vault_id,
            vault_name: vault_name.to_owned(),
            owner_public_key: owner,
            relays,
            invitee_name,
            status: InvitationStatus::Pending,
            created_at: UtcDateTime::now(),
            redeemed_by: None,
            redeemed_at: None,
            reason: None,
        };
        self.write(&link).await?;

        let placeholder = self
            .configurations
            .add_placeholder(
                &vault_id,
                link.invitee_name.as_deref().unwrap_or(DEFAULT_INVITEE_NAME),
                &link.invite_code,
            )
            .await;
        if let Err(e) = placeholder {
            if let Err(remove) = self.store.remove(&Self::key(&link.invite_code)?).await {
                tracing::warn!(
                    invite_code = %link.invite_code,
                    error = %remove,
                    "invitation::rollback_failed");
            }
            return Err(e);
        }

        tracing::debug!(
            vault_id = %vault_id,
            invite_code = %link.invite_code,
            "invitation::create");
        Ok(link)
    }

    /// Redeem an invitation for an invitee.
    pub async fn redeem(
        &self,
        invite_code: &str,
        invitee_public_key: &PublicKey,
        invitee_name: Option<&str>,
    ) -> Result<Trustee> {
        let invite_code = Self::parse_code(invite_code)?;
        let _guard = self.locks.lock(&invite_code).await;
        let mut link = self.read_required(&invite_code).await?;
        ensure_pending(&link)?;
        if invitee_public_key == &link.owner_public_key {
            return Err(Error::SelfInvitationRejected);
        }

        let pending = link.clone();
        link.status = InvitationStatus::Redeemed;
        link.redeemed_by = Some(invitee_public_key.clone());
        link.redeemed_at = Some(UtcDateTime::now());
        self.write(&link).await?;

        let accepted = self
            .configurations
            .accept_invitation(
                &link.vault_id,
                &invite_code,
                invitee_public_key,
                invitee_name,
            )
            .await;
        let trustee = match accepted {
            Ok(trustee) => trustee,
            Err(e) => {
                if let Err(restore) = self.write(&pending).await {
                    tracing::warn!(
                        invite_code = %invite_code,
                        error = %restore,
                        "invitation::rollback_failed");
                }
                return Err(e);
            }
        };

        tracing::debug!(
            vault_id = %link.vault_id,
            invite_code = %invite_code,
            invitee = %invitee_public_key.short(),
            "invitation::redeem");
        Ok(trustee)
    }

    /// Mark an invitation as declined by the invitee.
    pub async fn deny(
        &self,
        invite_code: &str,
        reason: Option<String>,
    ) -> Result<InvitationLink> {
        let invite_code = Self::parse_code(invite_code)?;
        let _guard = self.locks.lock(&invite_code).await;
        let mut link = self.read_required(&invite_code).await?;
        ensure_pending(&link)?;

        self.configurations
            .remove_trustee(&link.vault_id, TrusteeSelector::InviteCode(&invite_code))
            .await?;

        link.status = InvitationStatus::Denied;
        link.reason = reason;
        self.write(&link).await?;

        tracing::debug!(
            vault_id = %link.vault_id,
            invite_code = %invite_code,
            "invitation::deny");
        Ok(link)
    }

    /// Withdraw an invitation.
    ///
    /// When the invitation was already redeemed the trustee is
    /// removed from the vault and told about the revocation.
    pub async fn invalidate(
        &self,
        invite_code: &str,
        reason: String,
    ) -> Result<InvitationLink> {
        let invite_code = Self::parse_code(invite_code)?;
        let _guard = self.locks.lock(&invite_code).await;
        let mut link = self.read_required(&invite_code).await?;

        let redeemer = match link.status {
            InvitationStatus::Pending => None,
            InvitationStatus::Redeemed => link.redeemed_by.clone(),
            InvitationStatus::Denied => {
                return Err(Error::InvitationDenied(invite_code))
            }
            InvitationStatus::Invalidated => {
                return Err(Error::InvitationInvalidated(invite_code))
            }
        };

        let selector = match &redeemer {
            Some(public_key) => TrusteeSelector::PublicKey(public_key),
            None => TrusteeSelector::InviteCode(&invite_code),
        };
        self.configurations
            .remove_trustee(&link.vault_id, selector)
            .await?;

        link.status = InvitationStatus::Invalidated;
        link.reason = Some(reason.clone());
        self.write(&link).await?;

        if let Some(redeemer) = redeemer {
            let payload = Payload::Revocation(RevocationPayload {
                invite_code: invite_code.clone(),
                vault_id: link.vault_id,
                reason,
            });
            if let Err(e) = self.send(&redeemer, &link.relays, &payload).await {
                tracing::warn!(
                    invite_code = %invite_code,
                    error = %e,
                    "invitation::revocation_not_sent");
            }
        }

        tracing::debug!(
            vault_id = %link.vault_id,
            invite_code = %invite_code,
            "invitation::invalidate");
        Ok(link)
    }

    /// Apply an RSVP from an invitee.
    pub async fn on_rsvp_event(
        &self,
        event: &InboundEvent,
        payload: &RsvpPayload,
    ) -> EventOutcome {
        if payload.invitee_public_key != event.sender {
            tracing::warn!(
                event_id = %event.event_id,
                "invitation::rsvp_sender_mismatch");
            return EventOutcome::Dropped;
        }
        match self
            .redeem(
                payload.invite_code.as_str(),
                &payload.invitee_public_key,
                payload.invitee_name.as_deref(),
            )
            .await
        {
            Ok(_) => EventOutcome::Applied,
            Err(Error::InvitationAlreadyRedeemed(code)) => {
                tracing::debug!(invite_code = %code, "invitation::rsvp_duplicate");
                EventOutcome::Duplicate
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "invitation::rsvp_dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Apply a denial from an invitee.
    pub async fn on_denial_event(
        &self,
        event: &InboundEvent,
        payload: &DenialPayload,
    ) -> EventOutcome {
        if payload
            .invitee_public_key
            .as_ref()
            .is_some_and(|key| key != &event.sender)
        {
            tracing::warn!(
                event_id = %event.event_id,
                "invitation::denial_sender_mismatch");
            return EventOutcome::Dropped;
        }
        match self
            .deny(payload.invite_code.as_str(), payload.reason.clone())
            .await
        {
            Ok(_) => EventOutcome::Applied,
            Err(Error::InvitationDenied(code)) => {
                tracing::debug!(invite_code = %code, "invitation::denial_duplicate");
                EventOutcome::Duplicate
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "invitation::denial_dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Accept an invitation received from a vault owner.
    pub async fn accept_invitation(
        &self,
        link: &InvitationLink,
        invitee_name: Option<String>,
    ) -> Result<EventId> {
        let public_key = self.identity.public_key();
        if public_key == link.owner_public_key {
            return Err(Error::SelfInvitationRejected);
        }
        let payload = Payload::Rsvp(RsvpPayload {
            invite_code: link.invite_code.clone(),
            invitee_public_key: public_key,
            invitee_name,
        });
        let event_id = self
            .send(&link.owner_public_key, &link.relays, &payload)
            .await?;
        tracing::debug!(
            vault_id = %link.vault_id,
            event_id = %event_id,
            "invitation::accept");
        Ok(event_id)
    }

    /// Decline an invitation received from a vault owner.
    pub async fn decline_invitation(
        &self,
        link: &InvitationLink,
        reason: Option<String>,
    ) -> Result<EventId> {
        let payload = Payload::Denial(DenialPayload {
            invite_code: link.invite_code.clone(),
            invitee_public_key: Some(self.identity.public_key()),
            reason,
        });
        let event_id = self
            .send(&link.owner_public_key, &link.relays, &payload)
            .await?;
        tracing::debug!(
            vault_id = %link.vault_id,
            event_id = %event_id,
            "invitation::decline");
        Ok(event_id)
    }

    /// Discard the share held for a vault after the owner
    /// revoked the invitation.
    pub async fn on_revocation_event(
        &self,
        event: &InboundEvent,
        payload: &RevocationPayload,
    ) -> EventOutcome {
        let held = match self.held_shares.get(&payload.vault_id).await {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(error = %e, "invitation::revocation_failed");
                return EventOutcome::Dropped;
            }
        };
        let Some(held) = held else {
            return EventOutcome::Duplicate;
        };
        if held.owner != event.sender {
            tracing::warn!(
                vault_id = %payload.vault_id,
                sender = %event.sender.short(),
                "invitation::revocation_not_owner");
            return EventOutcome::Dropped;
        }
        match self.held_shares.remove(&payload.vault_id).await {
            Ok(_) => {
                self.notifier.notify(Notification::ShareRevoked {
                    vault_id: payload.vault_id,
                });
                tracing::debug!(
                    vault_id = %payload.vault_id,
                    reason = %payload.reason,
                    "invitation::revoked");
                EventOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "invitation::revocation_failed");
                EventOutcome::Dropped
            }
        }
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
}

fn ensure_pending(link: &InvitationLink) -> Result<()> {
    let code = link.invite_code.clone();
    match link.status {
        InvitationStatus::Pending => Ok(()),
        InvitationStatus::Redeemed => Err(Error::InvitationAlreadyRedeemed(code)),
        InvitationStatus::Denied => Err(Error::InvitationDenied(code)),
        InvitationStatus::Invalidated => Err(Error::InvitationInvalidated(code)),
    }
}
