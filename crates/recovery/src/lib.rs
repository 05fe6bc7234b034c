//! Social recovery for vault secrets.
//!
//! A vault owner splits a secret into shares, invites trustees
//! and sends each trustee one share over an encrypted event
//! transport. Later any device can ask the trustees for their
//! shares and rebuild the secret once enough of them approve.
//!
//! [SocialRecovery] builds every component for a local identity
//! and applies inbound events as they arrive:
//!
//! * [BackupConfigurationStore] owns the threshold, trustee list
//!   and distribution version of each vault.
//! * [TrusteeInvitationManager] issues invite codes and tracks
//!   the invitation lifecycle.
//! * [ShardDistributor] sends shares and tracks confirmations.
//! * [RecoveryCoordinator] collects responses and reconstructs.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod configuration;
mod coordinator;
mod distributor;
mod engine;
mod error;
mod invitation;
mod locks;
mod notify;
mod shares;
mod types;

pub use configuration::BackupConfigurationStore;
pub use coordinator::RecoveryCoordinator;
pub use distributor::ShardDistributor;
pub use engine::SocialRecovery;
pub use error::Error;
pub use invitation::TrusteeInvitationManager;
pub use locks::KeyedLocks;
pub use notify::{Notification, Notifier};
pub use shares::HeldShareStore;
pub use types::*;

pub use keyward_shamir::secrecy;

use keyward_signer::IdentityStore;
use std::sync::Arc;

/// Identity shared by the recovery components.
pub type SharedIdentity = Arc<dyn IdentityStore + Send + Sync + 'static>;

/// Result type for the recovery library.
pub type Result<T> = std::result::Result<T, Error>;
