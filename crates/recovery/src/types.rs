//! Records persisted by the recovery components.
use crate::{Error, Result};
use indexmap::IndexMap;
use keyward_core::{
    constants::{MAX_TRUSTEES, MIN_THRESHOLD},
    EventId, InviteCode, PublicKey, RecoveryRequestId, RelaySet, SplitId,
    TrusteeId, UtcDateTime, VaultId,
};
use keyward_protocol::RecoveryRequestPayload;
use keyward_shamir::ShareRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of applying an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event changed local state.
    Applied,
    /// The event was already applied.
    Duplicate,
    /// The event was ignored.
    Dropped,
}

/// Status of a trustee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrusteeStatus {
    /// Invitation sent, no public key yet.
    Invited,
    /// Public key known, waiting for a share.
    AwaitingKey,
    /// Trustee confirmed the current share.
    HoldingKey,
    /// Trustee holds an outdated share and waits for a new one.
    AwaitingNewKey,
    /// Delivery to the trustee failed.
    Error,
}

impl fmt::Display for TrusteeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invited => "invited",
            Self::AwaitingKey => "awaitingKey",
            Self::HoldingKey => "holdingKey",
            Self::AwaitingNewKey => "awaitingNewKey",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Reference to the share last sent to a trustee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldShareRef {
    /// Index of the share.
    pub shard_index: u8,
    /// Split the share belongs to.
    pub split_id: SplitId,
    /// Distribution version the share was sent for.
    pub distribution_version: u64,
}

/// Trustee of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trustee {
    /// Identifier of the trustee entry.
    pub id: TrusteeId,
    /// Display name.
    pub name: String,
    /// Public key, unknown until the invitation is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    /// Invite code the trustee was invited with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<InviteCode>,
    /// Current status.
    pub status: TrusteeStatus,
    /// Date and time the current share was confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<UtcDateTime>,
    /// Event that confirmed the current share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledgment_event_id: Option<EventId>,
    /// Distribution version of the confirmed share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_distribution_version: Option<u64>,
    /// Share last sent to the trustee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_share: Option<HeldShareRef>,
    /// Last reported failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Status before entering the error state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<TrusteeStatus>,
}

impl Trustee {
    /// Placeholder for an invitation that has not been accepted.
    pub fn new_invited(name: impl Into<String>, invite_code: InviteCode) -> Self {
        Self::new(name.into(), None, Some(invite_code), TrusteeStatus::Invited)
    }

    /// Trustee whose public key is known.
    pub fn new_with_key(name: impl Into<String>, public_key: PublicKey) -> Self {
        Self::new(
            name.into(),
            Some(public_key),
            None,
            TrusteeStatus::AwaitingKey,
        )
    }

    pub(crate) fn new(
        name: String,
        public_key: Option<PublicKey>,
        invite_code: Option<InviteCode>,
        status: TrusteeStatus,
    ) -> Self {
        Self {
            id: TrusteeId::new_v4(),
            name,
            public_key,
            invite_code,
            status,
            acknowledged_at: None,
            acknowledgment_event_id: None,
            acknowledged_distribution_version: None,
            held_share: None,
            last_error: None,
            previous_status: None,
        }
    }

    /// Determine if this entry is an unredeemed invitation.
    pub fn is_placeholder(&self) -> bool {
        self.public_key.is_none()
    }

    /// Reset after the distribution version changed.
    pub(crate) fn reset_for_redistribution(&mut self) {
        if self.status == TrusteeStatus::Invited || self.public_key.is_none() {
            return;
        }
        self.status = match self.status {
            TrusteeStatus::HoldingKey => TrusteeStatus::AwaitingNewKey,
            _ => TrusteeStatus::AwaitingKey,
        };
        self.acknowledged_at = None;
        self.acknowledgment_event_id = None;
        self.acknowledged_distribution_version = None;
        self.held_share = None;
        self.last_error = None;
        self.previous_status = None;
    }

    /// Move to the error state remembering the current status.
    pub(crate) fn set_error(&mut self, message: String) {
        if self.status != TrusteeStatus::Error {
            self.previous_status = Some(self.status);
        }
        self.status = TrusteeStatus::Error;
        self.last_error = Some(message);
    }
}

/// Lifecycle of a backup configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupStatus {
    /// Created by an invitation, trustees are still being gathered.
    Draft,
    /// Threshold and trustees are final.
    Active,
}

/// Social recovery settings for a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfiguration {
    /// Vault protected by the configuration.
    pub vault_id: VaultId,
    /// Display name of the vault.
    pub vault_name: String,
    /// Public key of the vault owner.
    pub owner: PublicKey,
    /// Number of shares required to recover.
    pub threshold: u8,
    /// Number of shares distributed.
    pub total_keys: u8,
    /// Trustees in share order.
    pub trustees: Vec<Trustee>,
    /// Relays used to reach the trustees.
    pub relays: RelaySet,
    /// Instructions shown to trustees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Incremented whenever previously distributed shares
    /// become outdated.
    pub distribution_version: u64,
    /// Lifecycle status.
    pub status: BackupStatus,
    /// Date and time the configuration was created.
    pub created_at: UtcDateTime,
    /// Date and time of the last change.
    pub last_updated: UtcDateTime,
    /// Date and time shares were last distributed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_redistribution: Option<UtcDateTime>,
    /// Recently applied inbound events.
    #[serde(default)]
    pub processed_events: Vec<EventId>,
}

impl BackupConfiguration {
    /// Check the threshold, trustee count and trustee keys.
    pub fn validate(&self) -> Result<()> {
        let total = self.trustees.len();
        if self.threshold < MIN_THRESHOLD
            || self.threshold > self.total_keys
            || self.total_keys > MAX_TRUSTEES
        {
            return Err(Error::InvalidThreshold {
                threshold: self.threshold,
                total: self.total_keys as usize,
                max: MAX_TRUSTEES,
            });
        }
        if total != self.total_keys as usize {
            return Err(Error::TrusteeCountMismatch {
                expected: self.total_keys,
                actual: total,
            });
        }
        self.validate_keys()
    }

    pub(crate) fn validate_keys(&self) -> Result<()> {
        let mut seen: Vec<&PublicKey> = vec![&self.owner];
        for key in self.trustees.iter().filter_map(|t| t.public_key.as_ref()) {
            if seen.contains(&key) {
                return Err(Error::DuplicateTrustee(key.clone()));
            }
            seen.push(key);
        }
        Ok(())
    }

    /// Find a trustee by public key.
    pub fn trustee_by_key(&self, public_key: &PublicKey) -> Option<&Trustee> {
        self.trustees
            .iter()
            .find(|t| t.public_key.as_ref() == Some(public_key))
    }

    /// Find a trustee by invite code.
    pub fn trustee_by_code(&self, invite_code: &InviteCode) -> Option<&Trustee> {
        self.trustees
            .iter()
            .find(|t| t.invite_code.as_ref() == Some(invite_code))
    }

    /// Number of trustees holding the current share.
    pub fn holding_count(&self) -> usize {
        self.trustees
            .iter()
            .filter(|t| t.status == TrusteeStatus::HoldingKey)
            .count()
    }

    /// Increment the distribution version and reset trustees.
    pub(crate) fn bump_version(&mut self) {
        self.distribution_version += 1;
        for trustee in self.trustees.iter_mut() {
            trustee.reset_for_redistribution();
        }
    }

    /// Determine if an inbound event was already applied.
    pub(crate) fn has_processed(&self, event_id: &EventId) -> bool {
        self.processed_events.contains(event_id)
    }

    /// Remember an applied event, forgetting the oldest ones
    /// beyond `limit`.
    pub(crate) fn remember_event(&mut self, event_id: EventId, limit: usize) {
        self.processed_events.push(event_id);
        if self.processed_events.len() > limit {
            let excess = self.processed_events.len() - limit;
            self.processed_events.drain(0..excess);
        }
    }

    /// Keep the key count in line with the trustee list.
    pub(crate) fn sync_total(&mut self) {
        self.total_keys = self.trustees.len() as u8;
    }
}

/// Result of sending a share to one trustee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Trustee entry.
    pub trustee_id: TrusteeId,
    /// Public key of the trustee.
    pub public_key: Option<PublicKey>,
    /// Index of the share.
    pub shard_index: u8,
    /// Split the share belongs to.
    pub split_id: SplitId,
    /// What happened.
    pub outcome: DeliveryOutcome,
}

/// Outcome of a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Published to the transport.
    Sent(EventId),
    /// Trustee has no public key yet.
    Skipped,
    /// Transport rejected the event.
    Failed(String),
}

/// Changes applied by a merge.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationUpdate {
    /// New vault name.
    pub vault_name: Option<String>,
    /// New threshold.
    pub threshold: Option<u8>,
    /// New trustee list, matched to the existing list by trustee id.
    pub trustees: Option<Vec<Trustee>>,
    /// New relay set.
    pub relays: Option<RelaySet>,
    /// New instructions.
    pub instructions: Option<String>,
}

/// Status of an invitation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvitationStatus {
    /// Waiting for the invitee.
    Pending,
    /// Accepted by the invitee.
    Redeemed,
    /// Declined by the invitee.
    Denied,
    /// Withdrawn by the owner.
    Invalidated,
}

/// Invitation for a trustee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationLink {
    /// Code identifying the invitation.
    pub invite_code: InviteCode,
    /// Vault the invitation is for.
    pub vault_id: VaultId,
    /// Display name of the vault.
    pub vault_name: String,
    /// Public key of the vault owner.
    pub owner_public_key: PublicKey,
    /// Relays used to reach the owner.
    pub relays: RelaySet,
    /// Name of the invitee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_name: Option<String>,
    /// Current status.
    pub status: InvitationStatus,
    /// Date and time the invitation was created.
    pub created_at: UtcDateTime,
    /// Public key of the invitee that redeemed the invitation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_by: Option<PublicKey>,
    /// Date and time the invitation was redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<UtcDateTime>,
    /// Reason given when the invitation was denied or invalidated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Status of a recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryStatus {
    /// Created, not yet transmitted.
    Pending,
    /// Transmitted to at least one trustee.
    Sent,
    /// At least one response arrived.
    InProgress,
    /// Enough approvals arrived.
    Completed,
    /// Cancelled by the initiator.
    Cancelled,
    /// Recovery mode was exited.
    Archived,
}

impl RecoveryStatus {
    /// Determine if the request still waits for responses.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent | Self::InProgress)
    }

    /// Determine if the request ignores responses.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Archived)
    }
}

/// Response from a trustee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponse {
    /// Whether the trustee approved.
    pub approved: bool,
    /// Date and time the response was recorded.
    pub responded_at: UtcDateTime,
    /// Share released by the trustee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_record: Option<ShareRecord>,
    /// Event that carried the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<EventId>,
}

/// Request to recover a vault from its trustees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    /// Identifier of the request.
    pub id: RecoveryRequestId,
    /// Vault being recovered.
    pub vault_id: VaultId,
    /// Public key of the initiator.
    pub initiator: PublicKey,
    /// Date and time of the request.
    pub requested_at: UtcDateTime,
    /// Informational expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UtcDateTime>,
    /// Number of approvals needed.
    pub threshold: u8,
    /// Relays used to reach the trustees.
    pub relays: RelaySet,
    /// Current status.
    pub status: RecoveryStatus,
    /// Response slot for each trustee that was asked.
    pub responses: IndexMap<PublicKey, Option<RecoveryResponse>>,
    /// Date and time the request was completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<UtcDateTime>,
}

impl RecoveryRequest {
    /// Summarize the responses.
    pub fn progress(&self) -> RecoveryProgress {
        let answered = self.responses.values().flatten();
        let responded_count = answered.clone().count();
        let approved_count = answered.filter(|r| r.approved).count();
        RecoveryProgress {
            request_id: self.id,
            status: self.status,
            threshold: self.threshold,
            responded_count,
            approved_count,
            denied_count: responded_count - approved_count,
            can_recover: !self.status.is_closed()
                && self.recoverable_shares().is_some(),
        }
    }

    /// Approved shares from one split with at least `threshold`
    /// distinct share indices.
    ///
    /// Shares are grouped by split; when several groups qualify
    /// the largest is returned.
    pub fn recoverable_shares(&self) -> Option<Vec<ShareRecord>> {
        let mut groups: Vec<Vec<ShareRecord>> = Vec::new();
        for share in self.approved_shares() {
            if share.vault_id != self.vault_id || share.threshold != self.threshold {
                continue;
            }
            match groups.iter_mut().find(|g| g[0].is_compatible(&share)) {
                Some(group) => {
                    if group.iter().all(|s| s.share_index != share.share_index) {
                        group.push(share);
                    }
                }
                None => groups.push(vec![share]),
            }
        }
        groups
            .into_iter()
            .filter(|g| g.len() >= self.threshold as usize)
            .max_by_key(|g| g.len())
    }

    /// Shares released by approving trustees.
    pub fn approved_shares(&self) -> Vec<ShareRecord> {
        self.responses
            .values()
            .flatten()
            .filter(|r| r.approved)
            .filter_map(|r| r.share_record.clone())
            .collect()
    }

    pub(crate) fn has_source_event(&self, event_id: &EventId) -> bool {
        self.responses
            .values()
            .flatten()
            .any(|r| r.source_event_id.as_ref() == Some(event_id))
    }

    /// Remove cached shares from every response.
    pub(crate) fn purge_shares(&mut self) {
        for response in self.responses.values_mut().flatten() {
            response.share_record = None;
        }
    }
}

/// Summary of the responses to a recovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryProgress {
    /// Identifier of the request.
    pub request_id: RecoveryRequestId,
    /// Current status.
    pub status: RecoveryStatus,
    /// Number of approvals needed.
    pub threshold: u8,
    /// Number of trustees that responded.
    pub responded_count: usize,
    /// Number of approvals.
    pub approved_count: usize,
    /// Number of denials.
    pub denied_count: usize,
    /// Whether enough shares arrived to reconstruct.
    pub can_recover: bool,
}

/// Recovery request received by the local trustee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRecoveryRequest {
    /// Request as sent by the initiator.
    pub request: RecoveryRequestPayload,
    /// Date and time the request arrived.
    pub received_at: UtcDateTime,
    /// Event that carried the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<EventId>,
    /// Answer sent by the local trustee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Date and time the answer was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<UtcDateTime>,
}

/// Share held by the local trustee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldShare {
    /// Vault the share belongs to.
    pub vault_id: VaultId,
    /// Display name of the vault.
    pub vault_name: String,
    /// Public key of the vault owner.
    pub owner: PublicKey,
    /// The share.
    pub share: ShareRecord,
    /// Distribution version the share arrived with.
    pub distribution_version: u64,
    /// Other trustees of the vault.
    pub peers: Vec<PublicKey>,
    /// Date and time the share arrived.
    pub received_at: UtcDateTime,
    /// Event that carried the share.
    pub source_event_id: EventId,
}
