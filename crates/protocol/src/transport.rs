use crate::{EventFilter, Result, TransportEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use keyward_core::{EventId, RelaySet};
use keyward_signer::Envelope;
use std::sync::Arc;

/// Shared event transport.
pub type BoxedTransport = Arc<dyn EventTransport + Send + Sync + 'static>;

/// Store and forward transport for envelopes.
///
/// Delivery is at least once and unordered; subscribers
/// must tolerate duplicates.
#[async_trait]
pub trait EventTransport {
    /// Publish an envelope to the given relays.
    async fn publish(
        &self,
        envelope: Envelope,
        relays: &RelaySet,
    ) -> Result<EventId>;

    /// Subscribe to events matching a filter.
    ///
    /// Stored events that match the filter are delivered first
    /// followed by events published after the subscription.
    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<BoxStream<'static, TransportEvent>>;
}
