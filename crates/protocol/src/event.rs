use crate::{EventKind, Payload, Result};
use keyward_core::{EventId, PublicKey, UtcDateTime};
use keyward_signer::{
    envelope::{seal, unwrap, wrap},
    Envelope, IdentityStore,
};
use serde::{Deserialize, Serialize};

/// Event as seen by the transport.
///
/// Relays only see the recipient and the opaque envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEvent {
    /// Identifier assigned when the event was published.
    pub event_id: EventId,
    /// Encrypted envelope.
    pub envelope: Envelope,
    /// Date and time the event was published.
    pub published_at: UtcDateTime,
}

/// Event decrypted and authenticated by the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Identifier of the event.
    pub event_id: EventId,
    /// Authenticated author of the event.
    pub sender: PublicKey,
    /// Date and time the author signed the event.
    pub created_at: UtcDateTime,
    /// Event content.
    pub payload: Payload,
}

impl InboundEvent {
    /// Kind of the event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Selects the events delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events addressed to this key.
    pub recipient: PublicKey,
    /// Only events published at or after this time.
    pub since: Option<UtcDateTime>,
}

impl EventFilter {
    /// Filter for every event addressed to a recipient.
    pub fn recipient(recipient: PublicKey) -> Self {
        Self {
            recipient,
            since: None,
        }
    }

    /// Determine if an event matches this filter.
    pub fn matches(&self, event: &TransportEvent) -> bool {
        event.envelope.recipient == self.recipient
            && self
                .since
                .map(|since| event.published_at >= since)
                .unwrap_or(true)
    }
}

/// Sign a payload as `identity` and encrypt it to `recipient`.
pub async fn encode_event(
    identity: &dyn IdentityStore,
    recipient: &PublicKey,
    payload: &Payload,
) -> Result<Envelope> {
    let content = serde_json::to_string(payload)?;
    let record = seal(identity, content).await?;
    Ok(wrap(&record, recipient, identity).await?)
}

/// Decrypt, authenticate and parse an event addressed to `identity`.
pub async fn decode_event(
    identity: &dyn IdentityStore,
    event: &TransportEvent,
) -> Result<InboundEvent> {
    let record = unwrap(&event.envelope, identity).await?;
    let payload: Payload = serde_json::from_str(&record.content)?;
    Ok(InboundEvent {
        event_id: event.event_id.clone(),
        sender: record.author,
        created_at: record.created_at,
        payload,
    })
}
