use keyward_core::PublicKey;
use thiserror::Error;

/// Errors generated by the signer library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a ciphertext is shorter than its nonce.
    #[error("ciphertext is too short")]
    CiphertextTooShort,

    /// Error generated when an envelope is opened by an
    /// identity it was not addressed to.
    #[error("envelope is addressed to {expected} not {actual}")]
    RecipientMismatch {
        /// Recipient named by the envelope.
        expected: PublicKey,
        /// Public key of the identity opening the envelope.
        actual: PublicKey,
    },

    /// Error generated when authenticated decryption fails.
    #[error("authenticated decryption failed")]
    Aead(#[from] chacha20poly1305::aead::Error),

    /// Error generated by signature creation or verification.
    #[error(transparent)]
    Signature(#[from] k256::ecdsa::Error),

    /// Error generated parsing curve points or scalars.
    #[error(transparent)]
    EllipticCurve(#[from] k256::elliptic_curve::Error),

    /// Error generated by the core library.
    #[error(transparent)]
    Core(#[from] keyward_core::Error),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
