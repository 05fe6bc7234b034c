//! Identity using the secp256k1 curve from the k256 library.
//!
//! Signatures are ECDSA over SHA-256. Encryption derives a
//! symmetric key from an ECDH shared secret and seals the
//! plaintext with XChaCha20Poly1305; the 24 byte nonce is
//! prepended to the ciphertext.
use crate::{BoxedIdentity, Error, IdentityStore, Result, Signature};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature as EcdsaSignature, SigningKey, VerifyingKey,
};
use keyward_core::{csprng, PublicKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

const KDF_DOMAIN: &[u8] = b"keyward/ecdh/xchacha20poly1305/v1";
const NONCE_LEN: usize = 24;

/// Identity for a single secp256k1 key.
#[derive(Clone)]
pub struct Secp256k1Identity(SigningKey);

impl Secp256k1Identity {
    /// Generate a new random identity.
    pub fn new_random() -> Self {
        let mut rng = csprng();
        Self(SigningKey::random(&mut rng))
    }

    /// Bytes of the private key.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().as_slice().to_vec()
    }

    fn shared_key(
        &self,
        other: &PublicKey,
    ) -> Result<chacha20poly1305::Key> {
        let other = k256::PublicKey::from_sec1_bytes(other.as_bytes())?;
        let shared = k256::ecdh::diffie_hellman(
            self.0.as_nonzero_scalar(),
            other.as_affine(),
        );
        let mut hasher = Sha256::new();
        hasher.update(KDF_DOMAIN);
        hasher.update(shared.raw_secret_bytes());
        Ok(hasher.finalize())
    }
}

impl fmt::Debug for Secp256k1Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secp256k1Identity")
            .field(&self.public_key())
            .finish()
    }
}

impl<'a> TryFrom<&'a [u8; 32]> for Secp256k1Identity {
    type Error = Error;

    fn try_from(value: &'a [u8; 32]) -> Result<Self> {
        Ok(Self(SigningKey::from_bytes(value.into())?))
    }
}

#[async_trait]
impl IdentityStore for Secp256k1Identity {
    fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        let mut compressed = [0u8; 33];
        compressed.copy_from_slice(point.as_bytes());
        compressed.into()
    }

    async fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signature: EcdsaSignature = self.0.try_sign(message)?;
        Ok(signature.to_bytes().to_vec().into())
    }

    fn verify(
        &self,
        signer: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<()> {
        let verifying_key = VerifyingKey::from_sec1_bytes(signer.as_bytes())?;
        let signature = EcdsaSignature::from_slice(signature.as_bytes())?;
        verifying_key.verify(message, &signature)?;
        Ok(())
    }

    async fn encrypt_for(
        &self,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let key = self.shared_key(recipient)?;
        let cipher = XChaCha20Poly1305::new(&key);
        let mut nonce = [0u8; NONCE_LEN];
        csprng().fill_bytes(&mut nonce);
        let ciphertext =
            cipher.encrypt(XNonce::from_slice(&nonce), plaintext)?;
        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    async fn decrypt_from(
        &self,
        sender: &PublicKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(Error::CiphertextTooShort);
        }
        let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);
        let key = self.shared_key(sender)?;
        let cipher = XChaCha20Poly1305::new(&key);
        Ok(cipher.decrypt(XNonce::from_slice(nonce), ciphertext)?)
    }

    fn ephemeral(&self) -> BoxedIdentity {
        Box::new(Self::new_random())
    }
}
