use crate::{constants::MAX_INVITE_CODE_LEN, csprng, Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Code that identifies an invitation.
///
/// Generated codes are random hex; codes received from elsewhere
/// are accepted when they are 1 to 64 characters of ASCII letters,
/// digits, `-` or `_`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct InviteCode(String);

impl InviteCode {
    /// Generate a random invite code from the given number of bytes.
    pub fn new_random(bytes: usize) -> Self {
        let mut buffer = vec![0u8; bytes.max(1)];
        csprng().fill_bytes(&mut buffer);
        Self(hex::encode(buffer))
    }

    /// String form of the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InviteCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= MAX_INVITE_CODE_LEN
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::InvalidInviteCode(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for InviteCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InviteCode> for String {
    fn from(value: InviteCode) -> Self {
        value.0
    }
}
