//! Engine configuration.
//!
//! Configuration is plain data; hosts typically embed a `[recovery]`
//! table in their own TOML file and load it with [Config::load].
use crate::{
    constants::{EVENT_HISTORY, INVITE_CODE_BYTES, MAX_RELAYS, MIN_THRESHOLD},
    Error, RelaySet, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Settings shared by the recovery components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Relays used when a vault or request does not name its own.
    pub default_relays: Vec<Url>,
    /// Threshold assigned to a configuration created by a
    /// first invitation.
    pub default_threshold: u8,
    /// Number of random bytes in generated invite codes.
    pub invite_code_bytes: usize,
    /// Maximum number of relays in a relay set created locally,
    /// between 1 and [MAX_RELAYS].
    pub max_relays: usize,
    /// Number of processed event identifiers remembered per vault.
    pub event_history: usize,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_relays: Vec::new(),
            default_threshold: MIN_THRESHOLD,
            invite_code_bytes: INVITE_CODE_BYTES,
            max_relays: MAX_RELAYS,
            event_history: EVENT_HISTORY,
            notification_capacity: 64,
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml(value: &str) -> Result<Self> {
        let config: Self = toml::from_str(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configured limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_relays == 0 || self.max_relays > MAX_RELAYS {
            return Err(Error::RelayLimit {
                value: self.max_relays,
                max: MAX_RELAYS,
            });
        }
        Ok(())
    }

    /// Number of relays allowed in a locally created relay set.
    ///
    /// Never exceeds [MAX_RELAYS], the limit every [RelaySet]
    /// enforces.
    pub fn relay_limit(&self) -> usize {
        self.max_relays.clamp(1, MAX_RELAYS)
    }

    /// Load configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        tracing::debug!(
            path = %path.as_ref().display(),
            "config::load");
        Self::from_toml(&content)
    }

    /// Default relays as a validated relay set.
    ///
    /// Returns `None` when no default relays are configured.
    pub fn default_relay_set(&self) -> Option<RelaySet> {
        if self.default_relays.is_empty() {
            None
        } else {
            RelaySet::new(self.default_relays.clone()).ok()
        }
    }
}
