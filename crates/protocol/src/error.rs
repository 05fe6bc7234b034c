use keyward_core::PublicKey;
use thiserror::Error;

/// Errors generated by the protocol library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a relay refuses to accept an event.
    #[error("relay rejected event for {0}")]
    Rejected(PublicKey),

    /// Error generated when the transport has been closed.
    #[error("transport closed")]
    Closed,

    /// Error generated by the core library.
    #[error(transparent)]
    Core(#[from] keyward_core::Error),

    /// Error generated by the signer library.
    #[error(transparent)]
    Signer(#[from] keyward_signer::Error),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
