//! Composition root for the recovery components.
use crate::{
    BackupConfigurationStore, EventOutcome, HeldShareStore, Notification,
    Notifier, RecoveryCoordinator, Result, ShardDistributor, SharedIdentity,
    TrusteeInvitationManager,
};
use futures::StreamExt;
use keyward_core::{Config, PublicKey};
use keyward_protocol::{
    decode_event, BoxedTransport, EventFilter, Payload, TransportEvent,
};
use keyward_storage::StorageProvider;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, oneshot, Mutex},
    task::JoinHandle,
};

/// Routes decoded events to the component that owns them.
#[derive(Clone)]
struct Dispatcher {
    identity: SharedIdentity,
    invitations: Arc<TrusteeInvitationManager>,
    distributor: Arc<ShardDistributor>,
    coordinator: Arc<RecoveryCoordinator>,
}

impl Dispatcher {
    async fn dispatch(&self, event: &TransportEvent) -> EventOutcome {
        let inbound = match decode_event(&*self.identity, event).await {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "engine::undecodable_event");
                return EventOutcome::Dropped;
            }
        };

        let outcome = match &inbound.payload {
            Payload::Rsvp(payload) => {
                self.invitations.on_rsvp_event(&inbound, payload).await
            }
            Payload::Denial(payload) => {
                self.invitations.on_denial_event(&inbound, payload).await
            }
            Payload::Revocation(payload) => {
                self.invitations.on_revocation_event(&inbound, payload).await
            }
            Payload::Shard(payload) => {
                self.distributor.on_shard_event(&inbound, payload).await
            }
            Payload::ShardConfirmation(payload) => {
                self.distributor
                    .on_shard_confirmation(&inbound, payload)
                    .await
            }
            Payload::ShardError(payload) => {
                self.distributor.on_shard_error(&inbound, payload).await
            }
            Payload::RecoveryRequest(payload) => {
                self.coordinator
                    .on_recovery_request_event(&inbound, payload)
                    .await
            }
            Payload::RecoveryResponse(payload) => {
                self.coordinator
                    .on_recovery_response_event(&inbound, payload)
                    .await
            }
        };

        tracing::debug!(
            event_id = %inbound.event_id,
            kind = %inbound.kind(),
            sender = %inbound.sender.short(),
            outcome = ?outcome,
            "engine::event");
        outcome
    }
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Social recovery for the local identity.
///
/// Builds the configuration store, invitation manager, share
/// distributor and recovery coordinator over shared storage,
/// transport and identity. Call [SocialRecovery::start] to apply
/// inbound events as they arrive.
pub struct SocialRecovery {
    identity: SharedIdentity,
    transport: BoxedTransport,
    notifier: Notifier,
    configurations: Arc<BackupConfigurationStore>,
    held_shares: Arc<HeldShareStore>,
    dispatcher: Dispatcher,
    listener: Mutex<Option<Listener>>,
}

impl SocialRecovery {
    /// Create the recovery components.
    pub fn new(
        identity: SharedIdentity,
        store: StorageProvider,
        transport: BoxedTransport,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);
        let notifier = Notifier::new(config.notification_capacity);
        let configurations = Arc::new(BackupConfigurationStore::new(
            Arc::clone(&store),
            notifier.clone(),
            &config,
        ));
        let held_shares = Arc::new(HeldShareStore::new(Arc::clone(&store)));

        let invitations = Arc::new(TrusteeInvitationManager::new(
            Arc::clone(&identity),
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&configurations),
            Arc::clone(&held_shares),
            notifier.clone(),
            Arc::clone(&config),
        ));
        let distributor = Arc::new(ShardDistributor::new(
            Arc::clone(&identity),
            Arc::clone(&transport),
            Arc::clone(&configurations),
            Arc::clone(&held_shares),
            notifier.clone(),
        ));
        let coordinator = Arc::new(RecoveryCoordinator::new(
            Arc::clone(&identity),
            store,
            Arc::clone(&transport),
            Arc::clone(&configurations),
            Arc::clone(&held_shares),
            notifier.clone(),
            config,
        ));

        Self {
            dispatcher: Dispatcher {
                identity: Arc::clone(&identity),
                invitations,
                distributor,
                coordinator,
            },
            identity,
            transport,
            notifier,
            configurations,
            held_shares,
            listener: Mutex::new(None),
        }
    }

    /// Public key of the local identity.
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Backup configurations.
    pub fn configurations(&self) -> &BackupConfigurationStore {
        &self.configurations
    }

    /// Trustee invitations.
    pub fn invitations(&self) -> &TrusteeInvitationManager {
        &self.dispatcher.invitations
    }

    /// Share distribution.
    pub fn distributor(&self) -> &ShardDistributor {
        &self.dispatcher.distributor
    }

    /// Recovery requests.
    pub fn coordinator(&self) -> &RecoveryCoordinator {
        &self.dispatcher.coordinator
    }

    /// Shares held for other vaults.
    pub fn held_shares(&self) -> &HeldShareStore {
        &self.held_shares
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Decode and apply a single event.
    pub async fn handle_event(&self, event: &TransportEvent) -> EventOutcome {
        self.dispatcher.dispatch(event).await
    }

    /// Subscribe to events addressed to the local identity and
    /// apply them in a background task.
    ///
    /// Calling `start` while already listening does nothing.
    pub async fn start(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let filter = EventFilter::recipient(self.identity.public_key());
        let mut events = self.transport.subscribe(filter).await?;
        let dispatcher = self.dispatcher.clone();
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.next() => {
                        match event {
                            Some(event) => {
                                dispatcher.dispatch(&event).await;
                            }
                            None => {
                                tracing::debug!("engine::stream_closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        tracing::debug!(
            public_key = %self.identity.public_key().short(),
            "engine::start");
        *listener = Some(Listener { shutdown, task });
        Ok(())
    }

    /// Stop the background listener.
    pub async fn shutdown(&self) {
        let listener = self.listener.lock().await.take();
        if let Some(Listener { shutdown, task }) = listener {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                tracing::error!(error = %e, "engine::listener_failed");
            }
            tracing::debug!("engine::shutdown");
        }
    }

    /// Determine if the background listener is running.
    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .map(|l| !l.task.is_finished())
            .unwrap_or(false)
    }
}
