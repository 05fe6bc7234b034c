use thiserror::Error;

/// Errors generated splitting and reconstructing secrets.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when the threshold or share count
    /// is out of range.
    #[error("invalid threshold {threshold} of {total}, expected 2 <= threshold <= total <= {max}")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: u8,
        /// Requested number of shares.
        total: u8,
        /// Maximum number of shares.
        max: u8,
    },

    /// Error generated when attempting to split an empty secret.
    #[error("secret must not be empty")]
    EmptySecret,

    /// Error generated when a secret is too large to encode.
    #[error("secret of {0} bytes is too large")]
    SecretTooLarge(usize),

    /// Error generated when reconstruction is attempted without shares.
    #[error("no shares supplied")]
    NoShares,

    /// Error generated when fewer distinct shares than the
    /// threshold are supplied.
    #[error("insufficient shares, {required} required but {provided} provided")]
    InsufficientShares {
        /// Threshold of the share set.
        required: u8,
        /// Number of distinct shares supplied.
        provided: usize,
    },

    /// Error generated when shares do not come from the same split.
    #[error("shares do not belong to the same split")]
    HeterogeneousShareSet,

    /// Error generated when a share was created over a different field.
    #[error("prime modulus {actual} does not match {expected}")]
    PrimeMismatch {
        /// Modulus of this implementation.
        expected: String,
        /// Modulus embedded in the share.
        actual: String,
    },

    /// Error generated when a share value cannot be decoded.
    #[error("malformed share: {0}")]
    MalformedShare(&'static str),

    /// Error generated by the secret sharing library.
    #[error("secret sharing failed: {0}")]
    Vsss(String),
}
