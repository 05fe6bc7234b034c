//! Core types and constants for the Keyward social recovery engine.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod config;
pub mod constants;
mod date_time;
mod error;
mod invite_code;
mod keys;
mod relay;

pub use config::Config;
pub use date_time::UtcDateTime;
pub use error::Error;
pub use invite_code::InviteCode;
pub use keys::{EventId, PublicKey};
pub use relay::RelaySet;

/// Result type for the library.
pub(crate) type Result<T> = std::result::Result<T, Error>;

use rand::{rngs::OsRng, CryptoRng, RngCore};

/// Exposes the default cryptographically secure RNG.
pub fn csprng() -> impl CryptoRng + RngCore {
    OsRng
}

/// Identifier for a vault.
pub type VaultId = uuid::Uuid;

/// Identifier for a trustee entry in a backup configuration.
pub type TrusteeId = uuid::Uuid;

/// Identifier for a recovery request.
pub type RecoveryRequestId = uuid::Uuid;

/// Identifier for one split of a secret.
pub type SplitId = uuid::Uuid;
