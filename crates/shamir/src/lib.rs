//! Threshold secret splitting for social recovery.
//!
//! Secrets are split into [ShareRecord]s which carry enough
//! metadata for a recipient to check that a set of shares belongs
//! together before attempting to combine them.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod splitter;

pub use error::Error;
pub use splitter::{SecretSplitter, PRIME_MODULUS};

pub use secrecy;

use keyward_core::{PublicKey, RelaySet, SplitId, UtcDateTime, VaultId};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::fmt;

/// Result type for the shamir library.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// One share of a split secret.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    /// Encoded share value.
    #[serde_as(as = "Base64")]
    pub share_value: Vec<u8>,
    /// One-based index of the share.
    pub share_index: u8,
    /// Number of shares required to reconstruct.
    pub threshold: u8,
    /// Number of shares created by the split.
    pub total_shares: u8,
    /// Hex encoded modulus of the field the share was created over.
    pub prime_modulus: String,
    /// Public key of the vault owner that created the split.
    pub creator: PublicKey,
    /// Vault the secret belongs to.
    pub vault_id: VaultId,
    /// Relays used to exchange events for the vault.
    pub relays: RelaySet,
    /// Identifier of the split operation.
    pub split_id: SplitId,
    /// Date and time the share was created.
    pub created_at: UtcDateTime,
    /// Date and time the share was received by a trustee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<UtcDateTime>,
}

impl ShareRecord {
    /// Determine if two shares can be combined.
    pub fn is_compatible(&self, other: &ShareRecord) -> bool {
        self.threshold == other.threshold
            && self.total_shares == other.total_shares
            && self.prime_modulus == other.prime_modulus
            && self.creator == other.creator
            && self.split_id == other.split_id
    }
}

impl fmt::Debug for ShareRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareRecord")
            .field("share_value", &"<redacted>")
            .field("share_index", &self.share_index)
            .field("threshold", &self.threshold)
            .field("total_shares", &self.total_shares)
            .field("creator", &self.creator)
            .field("vault_id", &self.vault_id)
            .field("split_id", &self.split_id)
            .finish()
    }
}
