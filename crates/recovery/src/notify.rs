//! Notifications for interfaces that observe recovery state.
//!
//! Use [Notifier::subscribe] to be told when configurations,
//! invitations, held shares or recovery requests change instead
//! of polling the stores.
use crate::{InvitationStatus, RecoveryProgress, TrusteeStatus};
use keyward_core::{InviteCode, PublicKey, RecoveryRequestId, TrusteeId, VaultId};
use tokio::sync::broadcast;

/// Change to recovery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A backup configuration was saved.
    ConfigurationChanged {
        /// Vault of the configuration.
        vault_id: VaultId,
        /// Current distribution version.
        distribution_version: u64,
    },
    /// A trustee changed status.
    TrusteeStatusChanged {
        /// Vault of the configuration.
        vault_id: VaultId,
        /// Trustee entry.
        trustee_id: TrusteeId,
        /// New status.
        status: TrusteeStatus,
    },
    /// An invitation changed status.
    InvitationChanged {
        /// Code of the invitation.
        invite_code: InviteCode,
        /// New status.
        status: InvitationStatus,
    },
    /// A share was stored for a vault owned by someone else.
    ShareReceived {
        /// Vault of the share.
        vault_id: VaultId,
        /// Owner of the vault.
        owner: PublicKey,
    },
    /// A held share was discarded after a revocation.
    ShareRevoked {
        /// Vault of the share.
        vault_id: VaultId,
    },
    /// A recovery request arrived for a held share.
    RecoveryRequestReceived {
        /// Identifier of the request.
        request_id: RecoveryRequestId,
        /// Vault being recovered.
        vault_id: VaultId,
        /// Public key of the initiator.
        initiator: PublicKey,
    },
    /// Responses to a recovery request changed.
    RecoveryProgress(RecoveryProgress),
}

/// Sends notifications to subscribers.
#[derive(Clone)]
pub struct Notifier {
    channel: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self { channel }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.channel.subscribe()
    }

    /// Send a notification.
    ///
    /// Notifications sent while nobody is subscribed are lost.
    pub fn notify(&self, notification: Notification) {
        let _ = self.channel.send(notification);
    }
}
