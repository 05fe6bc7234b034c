use keyward_core::{
    InviteCode, PublicKey, RecoveryRequestId, TrusteeId, VaultId,
};
use thiserror::Error;

/// Errors generated by the recovery library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a backup configuration does not exist.
    #[error("backup configuration for vault {0} not found")]
    VaultNotFound(VaultId),

    /// Error generated when creating a configuration that exists.
    #[error("backup configuration for vault {0} already exists")]
    ConfigurationExists(VaultId),

    /// Error generated when an operation requires an active
    /// configuration but the configuration is a draft.
    #[error("backup configuration for vault {0} is not active")]
    ConfigurationNotActive(VaultId),

    /// Error generated when a threshold or trustee count is invalid.
    #[error("invalid threshold {threshold} of {total}, expected 2 <= threshold <= total <= {max}")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: u8,
        /// Number of trustees.
        total: usize,
        /// Maximum number of trustees.
        max: u8,
    },

    /// Error generated when the trustee list length does not
    /// match the number of keys.
    #[error("expected {expected} trustees but got {actual}")]
    TrusteeCountMismatch {
        /// Number of keys in the configuration.
        expected: u8,
        /// Number of trustees supplied.
        actual: usize,
    },

    /// Error generated when a public key appears more than once
    /// in a trustee list or the owner is listed as a trustee.
    #[error("duplicate trustee {0}")]
    DuplicateTrustee(PublicKey),

    /// Error generated when a trustee is not found.
    #[error("trustee {0} not found")]
    TrusteeNotFound(TrusteeId),

    /// Error generated when the local identity does not own a vault.
    #[error("not the owner of vault {0}")]
    NotVaultOwner(VaultId),

    /// Error generated when an invitation does not exist.
    #[error("invitation {0} not found")]
    InvitationNotFound(InviteCode),

    /// Error generated when an invite code is already in use.
    #[error("invitation {0} already exists")]
    InvitationExists(InviteCode),

    /// Error generated when an invitation was already redeemed.
    #[error("invitation {0} already redeemed")]
    InvitationAlreadyRedeemed(InviteCode),

    /// Error generated when an invitation was invalidated.
    #[error("invitation {0} was invalidated")]
    InvitationInvalidated(InviteCode),

    /// Error generated when an invitation was declined.
    #[error("invitation {0} was declined")]
    InvitationDenied(InviteCode),

    /// Error generated when an invite code is malformed.
    #[error("invalid invite code '{0}'")]
    InvalidInviteCodeFormat(String),

    /// Error generated when a vault owner redeems their own invitation.
    #[error("cannot accept an invitation to your own vault")]
    SelfInvitationRejected,

    /// Error generated when a relay set is invalid.
    #[error("invalid relay set: {0}")]
    InvalidRelaySet(String),

    /// Error generated when the number of shares does not match
    /// the number of keys in a configuration.
    #[error("expected {expected} shares but got {actual}")]
    ShareCountMismatch {
        /// Number of keys in the configuration.
        expected: u8,
        /// Number of shares supplied.
        actual: usize,
    },

    /// Error generated when a share could not be delivered to a trustee.
    #[error("delivery to {trustee} failed: {message}")]
    DeliveryFailed {
        /// Public key of the trustee.
        trustee: PublicKey,
        /// Transport error message.
        message: String,
    },

    /// Error generated when a trustee has no share for a vault.
    #[error("no share held for vault {0}")]
    NoHeldShare(VaultId),

    /// Error generated when a recovery request does not exist.
    #[error("recovery request {0} not found")]
    RecoveryRequestNotFound(RecoveryRequestId),

    /// Error generated when an initiator already has an active
    /// recovery request for a vault.
    #[error("recovery request {request_id} for vault {vault_id} is still active")]
    DuplicateActiveRequest {
        /// Vault being recovered.
        vault_id: VaultId,
        /// Active request.
        request_id: RecoveryRequestId,
    },

    /// Error generated when recovery is attempted without
    /// enough approved shares.
    #[error("insufficient approvals, {required} required but {approved} approved")]
    InsufficientApprovals {
        /// Threshold of the request.
        required: u8,
        /// Number of approved responses with shares.
        approved: usize,
    },

    /// Error generated when a threshold disagrees with the
    /// request or trustee list.
    #[error("threshold mismatch, expected {expected} but got {actual}")]
    ThresholdMismatch {
        /// Expected threshold or bound.
        expected: u8,
        /// Threshold supplied.
        actual: u8,
    },

    /// Error generated when modifying a cancelled, archived or
    /// completed recovery request.
    #[error("recovery request {0} is closed")]
    RecoveryClosed(RecoveryRequestId),

    /// Error generated when a response comes from a key that
    /// was not asked.
    #[error("unknown responder {0}")]
    UnknownResponder(PublicKey),

    /// Error generated when an approval does not carry a share.
    #[error("approval from {0} does not carry a share")]
    ApprovalWithoutShare(PublicKey),

    /// Error generated when a released share does not belong to
    /// the vault or owner of a recovery request.
    #[error("share does not match the recovery request: {0}")]
    IncompatibleShare(&'static str),

    /// Error generated when the local trustee answers a recovery
    /// request a second time.
    #[error("recovery request {0} was already answered")]
    RecoveryAlreadyAnswered(RecoveryRequestId),

    /// Error generated by the core library.
    #[error(transparent)]
    Core(#[from] keyward_core::Error),

    /// Error generated by the signer library.
    #[error(transparent)]
    Signer(#[from] keyward_signer::Error),

    /// Error generated by the shamir library.
    #[error(transparent)]
    Shamir(#[from] keyward_shamir::Error),

    /// Error generated by the storage library.
    #[error(transparent)]
    Storage(#[from] keyward_storage::Error),

    /// Error generated by the protocol library.
    #[error(transparent)]
    Protocol(#[from] keyward_protocol::Error),
}
