use thiserror::Error;

/// Errors generated by the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a public key is not valid hex
    /// or has an unexpected length.
    #[error("invalid public key '{0}'")]
    InvalidPublicKey(String),

    /// Error generated when an invite code is malformed.
    #[error("invalid invite code '{0}'")]
    InvalidInviteCode(String),

    /// Error generated when an event identifier is malformed.
    #[error("invalid event id '{0}'")]
    InvalidEventId(String),

    /// Error generated when a relay set is empty or too large.
    #[error("relay set must contain between 1 and {max} relays, got {count}")]
    RelayCount {
        /// Number of relays supplied.
        count: usize,
        /// Maximum number of relays.
        max: usize,
    },

    /// Error generated when the configured relay limit is zero or
    /// above the protocol maximum.
    #[error("max-relays must be between 1 and {max}, got {value}")]
    RelayLimit {
        /// Configured limit.
        value: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// Error generated when a relay URL does not use a
    /// websocket scheme.
    #[error("relay '{0}' must use the ws or wss scheme")]
    RelayScheme(String),

    /// Error generated by the URL parser.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// Error generated decoding hex.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error generated parsing TOML configuration.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Error generated formatting a date time.
    #[error(transparent)]
    TimeFormat(#[from] time::error::Format),

    /// Error generated parsing a date time.
    #[error(transparent)]
    TimeParse(#[from] time::error::Parse),

    /// Error generated by input and output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
