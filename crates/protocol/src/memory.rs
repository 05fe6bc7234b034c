use crate::{Error, EventFilter, EventTransport, Result, TransportEvent};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use keyward_core::{EventId, PublicKey, RelaySet, UtcDateTime};
use keyward_signer::Envelope;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

/// In-process relay.
///
/// Every published event is stored and replayed to new
/// subscribers. Delivery to specific recipients can be made to
/// fail and stored events can be delivered again to exercise
/// duplicate handling.
pub struct MemoryTransport {
    events: RwLock<Vec<TransportEvent>>,
    channel: broadcast::Sender<TransportEvent>,
    failing: Mutex<HashSet<PublicKey>>,
}

impl MemoryTransport {
    /// Create a memory transport.
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self {
            events: RwLock::new(Vec::new()),
            channel,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Reject events addressed to a recipient.
    pub async fn fail_recipient(&self, recipient: PublicKey) {
        self.failing.lock().await.insert(recipient);
    }

    /// Accept events addressed to a recipient again.
    pub async fn restore_recipient(&self, recipient: &PublicKey) {
        self.failing.lock().await.remove(recipient);
    }

    /// Stored events in publication order.
    pub async fn events(&self) -> Vec<TransportEvent> {
        self.events.read().await.clone()
    }

    /// Deliver a stored event to current subscribers again.
    ///
    /// Returns false if the event is unknown.
    pub async fn redeliver(&self, event_id: &EventId) -> bool {
        let events = self.events.read().await;
        if let Some(event) = events.iter().find(|e| &e.event_id == event_id) {
            let _ = self.channel.send(event.clone());
            true
        } else {
            false
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    async fn publish(
        &self,
        envelope: Envelope,
        relays: &RelaySet,
    ) -> Result<EventId> {
        if self.failing.lock().await.contains(&envelope.recipient) {
            return Err(Error::Rejected(envelope.recipient));
        }

        let buffer = serde_json::to_vec(&envelope)?;
        let event_id = EventId::from_digest(&Sha256::digest(&buffer));
        let event = TransportEvent {
            event_id: event_id.clone(),
            envelope,
            published_at: UtcDateTime::now(),
        };

        let mut events = self.events.write().await;
        if events.iter().any(|e| e.event_id == event_id) {
            tracing::debug!(event_id = %event_id, "memory_transport::duplicate");
            return Ok(event_id);
        }
        events.push(event.clone());
        // No receivers is not an error, the event is stored
        let _ = self.channel.send(event);

        tracing::debug!(
            event_id = %event_id,
            relays = relays.len(),
            "memory_transport::publish");
        Ok(event_id)
    }

    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<BoxStream<'static, TransportEvent>> {
        // Hold the read lock so no event is both stored and broadcast
        // between the snapshot and the new receiver
        let events = self.events.read().await;
        let receiver = self.channel.subscribe();
        let stored: Vec<TransportEvent> = events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        drop(events);

        let live = BroadcastStream::new(receiver).filter_map(move |event| {
            let event = match event {
                Ok(event) if filter.matches(&event) => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        skipped = skipped,
                        "memory_transport::lagged");
                    None
                }
            };
            futures::future::ready(event)
        });

        Ok(futures::stream::iter(stored).chain(live).boxed())
    }
}
