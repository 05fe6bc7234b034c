use thiserror::Error;

/// Errors generated by storage providers.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a record identifier cannot be used
    /// as a storage key.
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    /// Error generated by the io module.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
