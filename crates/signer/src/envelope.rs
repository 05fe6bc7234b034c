//! Two layer envelope used for every event sent over the transport.
//!
//! The inner layer is a [SignedRecord] signed by its author. The
//! outer layer is an [Envelope] encrypted to a single recipient by
//! a throwaway key so intermediaries cannot link envelopes sent by
//! the same author to different recipients.
use crate::{Error, IdentityStore, Result, Signature};
use keyward_core::{PublicKey, UtcDateTime};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// Content signed by its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRecord {
    /// Public key of the author.
    pub author: PublicKey,
    /// Date and time the record was signed.
    pub created_at: UtcDateTime,
    /// Record content.
    pub content: String,
    /// Signature over the author, creation time and content.
    pub signature: Signature,
}

impl SignedRecord {
    fn signing_bytes(
        author: &PublicKey,
        created_at: &UtcDateTime,
        content: &str,
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&(author, created_at, content))?)
    }

    /// Verify the signature using the given identity scheme.
    pub fn verify(&self, verifier: &dyn IdentityStore) -> Result<()> {
        let message =
            Self::signing_bytes(&self.author, &self.created_at, &self.content)?;
        verifier.verify(&self.author, &message, &self.signature)
    }
}

/// Outer envelope addressed to one recipient.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Recipient of the envelope.
    pub recipient: PublicKey,
    /// Public half of the single-use key that encrypted the envelope.
    pub ephemeral_key: PublicKey,
    /// Encrypted [SignedRecord].
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
}

/// Sign content as the given identity.
pub async fn seal(
    author: &dyn IdentityStore,
    content: String,
) -> Result<SignedRecord> {
    let author_key = author.public_key();
    let created_at = UtcDateTime::now();
    let message = SignedRecord::signing_bytes(&author_key, &created_at, &content)?;
    let signature = author.sign(&message).await?;
    Ok(SignedRecord {
        author: author_key,
        created_at,
        content,
        signature,
    })
}

/// Encrypt a signed record to a recipient.
///
/// A fresh key of the same scheme as `origin` encrypts the record
/// and is dropped when this function returns.
pub async fn wrap(
    record: &SignedRecord,
    recipient: &PublicKey,
    origin: &dyn IdentityStore,
) -> Result<Envelope> {
    let ephemeral = origin.ephemeral();
    let plaintext = serde_json::to_vec(record)?;
    let ciphertext = ephemeral.encrypt_for(recipient, &plaintext).await?;
    Ok(Envelope {
        recipient: recipient.clone(),
        ephemeral_key: ephemeral.public_key(),
        ciphertext,
    })
}

/// Decrypt an envelope addressed to `identity` and verify the
/// signature of the inner record.
pub async fn unwrap(
    envelope: &Envelope,
    identity: &dyn IdentityStore,
) -> Result<SignedRecord> {
    let public_key = identity.public_key();
    if envelope.recipient != public_key {
        return Err(Error::RecipientMismatch {
            expected: envelope.recipient.clone(),
            actual: public_key,
        });
    }
    let plaintext = identity
        .decrypt_from(&envelope.ephemeral_key, &envelope.ciphertext)
        .await?;
    let record: SignedRecord = serde_json::from_slice(&plaintext)?;
    record.verify(identity)?;
    Ok(record)
}
