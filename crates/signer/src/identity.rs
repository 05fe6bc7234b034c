use crate::Result;
use async_trait::async_trait;
use keyward_core::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boxed identity.
pub type BoxedIdentity = Box<dyn IdentityStore + Send + Sync + 'static>;

/// Signature bytes produced by an identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(#[serde(with = "hex::serde")] Vec<u8>);

impl Signature {
    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Signature {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&hex::encode(&self.0)).finish()
    }
}

/// Key pair of the local participant.
///
/// Implementations keep the private key to themselves; callers only
/// see the public key and the results of signing and encryption.
/// This trait is declared with an async signature so that keys held
/// by a remote signer or a secure enclave can implement it.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Public key of this identity.
    fn public_key(&self) -> PublicKey;

    /// Sign a message.
    async fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// Verify a signature made by another identity of the same scheme.
    fn verify(
        &self,
        signer: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<()>;

    /// Encrypt plaintext so only `recipient` can read it and the
    /// recipient can authenticate this identity as the sender.
    async fn encrypt_for(
        &self,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Decrypt ciphertext produced by `sender` with [IdentityStore::encrypt_for].
    async fn decrypt_from(
        &self,
        sender: &PublicKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Generate a new random identity of the same scheme.
    ///
    /// Used for single-use keys that are discarded after one envelope.
    fn ephemeral(&self) -> BoxedIdentity;
}
