//! Identities, signatures and the envelope encryption used for
//! every event exchanged between participants.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod envelope;
mod error;
mod identity;
mod secp256k1;

pub use envelope::{Envelope, SignedRecord};
pub use error::Error;
pub use identity::{BoxedIdentity, IdentityStore, Signature};
pub use secp256k1::Secp256k1Identity;

/// Result type for the signer library.
pub(crate) type Result<T> = std::result::Result<T, Error>;
