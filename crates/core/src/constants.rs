//! Constants shared by the recovery crates.

/// Smallest threshold accepted for a secret split.
pub const MIN_THRESHOLD: u8 = 2;

/// Largest number of trustees (and shares) for a vault.
pub const MAX_TRUSTEES: u8 = 10;

/// Largest number of relays in a relay set.
pub const MAX_RELAYS: usize = 3;

/// Number of random bytes in a generated invite code.
pub const INVITE_CODE_BYTES: usize = 16;

/// Longest invite code accepted from the wire.
pub const MAX_INVITE_CODE_LEN: usize = 64;

/// Number of processed event identifiers remembered per vault.
pub const EVENT_HISTORY: usize = 512;
