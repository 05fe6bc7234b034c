//! Relay sets used to route events.
use crate::{constants::MAX_RELAYS, Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Ordered, de-duplicated set of between one and
/// [MAX_RELAYS] websocket relay URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Url>", into = "Vec<Url>")]
pub struct RelaySet(Vec<Url>);

impl RelaySet {
    /// Create a relay set from parsed URLs.
    pub fn new(relays: Vec<Url>) -> Result<Self> {
        let mut unique: Vec<Url> = Vec::with_capacity(relays.len());
        for relay in relays {
            if !matches!(relay.scheme(), "ws" | "wss") {
                return Err(Error::RelayScheme(relay.to_string()));
            }
            if !unique.contains(&relay) {
                unique.push(relay);
            }
        }
        if unique.is_empty() || unique.len() > MAX_RELAYS {
            return Err(Error::RelayCount {
                count: unique.len(),
                max: MAX_RELAYS,
            });
        }
        Ok(Self(unique))
    }

    /// Parse a relay set from strings.
    pub fn parse<S: AsRef<str>>(relays: &[S]) -> Result<Self> {
        let urls = relays
            .iter()
            .map(|r| Url::parse(r.as_ref().trim()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(urls)
    }

    /// Relay URLs.
    pub fn urls(&self) -> &[Url] {
        &self.0
    }

    /// Number of relays.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, a relay set is never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterator of the relay URLs.
    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Url>> for RelaySet {
    type Error = Error;

    fn try_from(value: Vec<Url>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RelaySet> for Vec<Url> {
    fn from(value: RelaySet) -> Self {
        value.0
    }
}
