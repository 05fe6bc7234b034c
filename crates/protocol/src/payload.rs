//! Payloads carried inside signed records.
use keyward_core::{
    InviteCode, PublicKey, RecoveryRequestId, RelaySet, UtcDateTime, VaultId,
};
use keyward_shamir::ShareRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events exchanged between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Invitee accepted an invitation.
    Rsvp,
    /// Invitee declined an invitation.
    Denial,
    /// Owner revoked a redeemed invitation.
    Revocation,
    /// Owner sent a share to a trustee.
    Shard,
    /// Trustee stored a share.
    ShardConfirmation,
    /// Trustee could not store a share.
    ShardError,
    /// Initiator asked trustees for their shares.
    RecoveryRequest,
    /// Trustee answered a recovery request.
    RecoveryResponse,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsvp => "rsvp",
            Self::Denial => "denial",
            Self::Revocation => "revocation",
            Self::Shard => "shard",
            Self::ShardConfirmation => "shard_confirmation",
            Self::ShardError => "shard_error",
            Self::RecoveryRequest => "recovery_request",
            Self::RecoveryResponse => "recovery_response",
        };
        write!(f, "{}", name)
    }
}

/// Invitee accepted an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpPayload {
    /// Invite code being redeemed.
    pub invite_code: InviteCode,
    /// Public key of the invitee.
    pub invitee_public_key: PublicKey,
    /// Name the invitee chose to share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_name: Option<String>,
}

/// Invitee declined an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialPayload {
    /// Invite code being declined.
    pub invite_code: InviteCode,
    /// Public key of the invitee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_public_key: Option<PublicKey>,
    /// Reason given by the invitee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Owner revoked a redeemed invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationPayload {
    /// Invite code that was revoked.
    pub invite_code: InviteCode,
    /// Vault the invitation was for.
    pub vault_id: VaultId,
    /// Reason for the revocation.
    pub reason: String,
}

/// Share sent from an owner to a trustee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardPayload {
    /// Vault the share belongs to.
    pub vault_id: VaultId,
    /// Display name of the vault.
    pub vault_name: String,
    /// Index of the share.
    pub shard_index: u8,
    /// The share.
    pub share: ShareRecord,
    /// Distribution version the share was sent for.
    pub distribution_version: u64,
    /// Public keys of the other trustees.
    pub peers: Vec<PublicKey>,
}

/// Trustee stored a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardConfirmationPayload {
    /// Vault the share belongs to.
    pub vault_id: VaultId,
    /// Index of the share.
    pub shard_index: u8,
    /// Distribution version of the share.
    pub distribution_version: u64,
}

/// Trustee could not store a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardErrorPayload {
    /// Vault the share belongs to.
    pub vault_id: VaultId,
    /// Index of the share.
    pub shard_index: u8,
    /// Distribution version of the share.
    pub distribution_version: u64,
    /// Description of the failure.
    pub error: String,
}

/// Initiator asked trustees for their shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequestPayload {
    /// Identifier of the request.
    pub request_id: RecoveryRequestId,
    /// Vault being recovered.
    pub vault_id: VaultId,
    /// Public key responses are sent to.
    pub initiator_public_key: PublicKey,
    /// Number of approvals needed.
    pub threshold: u8,
    /// Date and time of the request.
    pub requested_at: UtcDateTime,
    /// Informational expiry of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UtcDateTime>,
    /// Relays used for responses.
    pub relays: RelaySet,
}

/// Trustee answered a recovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponsePayload {
    /// Identifier of the request being answered.
    pub recovery_request_id: RecoveryRequestId,
    /// Vault being recovered.
    pub vault_id: VaultId,
    /// Public key of the responding trustee.
    pub responder_public_key: PublicKey,
    /// Whether the trustee approved the request.
    pub approved: bool,
    /// Share released when approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_record: Option<ShareRecord>,
}

/// Content of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase")]
pub enum Payload {
    /// Invitation accepted.
    Rsvp(RsvpPayload),
    /// Invitation declined.
    Denial(DenialPayload),
    /// Invitation revoked.
    Revocation(RevocationPayload),
    /// Share delivery.
    Shard(ShardPayload),
    /// Share stored.
    ShardConfirmation(ShardConfirmationPayload),
    /// Share rejected.
    ShardError(ShardErrorPayload),
    /// Recovery request.
    RecoveryRequest(RecoveryRequestPayload),
    /// Recovery response.
    RecoveryResponse(RecoveryResponsePayload),
}

impl Payload {
    /// Kind of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Rsvp(_) => EventKind::Rsvp,
            Self::Denial(_) => EventKind::Denial,
            Self::Revocation(_) => EventKind::Revocation,
            Self::Shard(_) => EventKind::Shard,
            Self::ShardConfirmation(_) => EventKind::ShardConfirmation,
            Self::ShardError(_) => EventKind::ShardError,
            Self::RecoveryRequest(_) => EventKind::RecoveryRequest,
            Self::RecoveryResponse(_) => EventKind::RecoveryResponse,
        }
    }
}
