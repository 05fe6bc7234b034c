//! Fixtures shared by the integration tests.
use anyhow::Result;
use keyward_core::{Config, RelaySet, VaultId};
use keyward_protocol::{MemoryTransport, TransportEvent};
use keyward_recovery::{
    DeliveryResult, EventOutcome, SocialRecovery, Trustee,
};
use keyward_signer::{IdentityStore, Secp256k1Identity};
use keyward_storage::{FileStore, MemoryStore, StorageProvider};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

pub mod assert;
pub mod mock;

/// Relay used by every test participant.
pub const RELAY: &str = "wss://relay.keyward.test";

/// Secret used by the backup and recovery tests.
pub const SECRET: &[u8] = b"correct horse battery staple 0123456789";

#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "integration=debug,keyward_recovery=debug,keyward_protocol=debug"
                    .into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer().without_time())
        .try_init();
}

/// Relay set containing [RELAY].
pub fn relays() -> Result<RelaySet> {
    Ok(RelaySet::parse(&[RELAY])?)
}

/// Engine configuration for tests.
pub fn test_config() -> Result<Config> {
    Ok(Config {
        default_relays: vec![RELAY.parse()?],
        ..Default::default()
    })
}

/// Pause a while to let background listeners apply events.
pub async fn sync_pause() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Directories for a test.
pub struct TestDirs {
    /// Directory for the test.
    pub target: PathBuf,
    /// One directory per participant.
    pub clients: Vec<PathBuf>,
}

/// Create fresh directories for a test.
pub async fn setup(test_id: &str, num_clients: usize) -> Result<TestDirs> {
    let target = std::env::temp_dir()
        .join("keyward-integration-test")
        .join(test_id);
    if tokio::fs::try_exists(&target).await? {
        tokio::fs::remove_dir_all(&target).await?;
    }
    tokio::fs::create_dir_all(&target).await?;

    let mut clients = Vec::new();
    for index in 0..num_clients {
        let client = target.join(format!("client{}", index + 1));
        tokio::fs::create_dir(&client).await?;
        clients.push(client);
    }
    Ok(TestDirs { target, clients })
}

/// Remove the directories for a test.
pub async fn teardown(test_id: &str) {
    let target = std::env::temp_dir()
        .join("keyward-integration-test")
        .join(test_id);
    let _ = tokio::fs::remove_dir_all(&target).await;
}

/// Participants connected to one in-process relay.
pub struct Network {
    /// Relay shared by the participants.
    pub transport: Arc<MemoryTransport>,
    config: Config,
}

impl Network {
    /// Create a network.
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(test_config()?))
    }

    /// Create a network whose participants share a configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            transport: Arc::new(MemoryTransport::default()),
            config,
        }
    }

    /// Add a participant backed by memory storage.
    pub fn participant(&self, name: &str) -> Participant {
        self.participant_with_store(name, Arc::new(MemoryStore::new()))
    }

    /// Add a participant that stores records below a directory.
    pub fn participant_in(&self, name: &str, dir: PathBuf) -> Participant {
        self.participant_with_store(name, Arc::new(FileStore::new(dir)))
    }

    /// Add a participant with an identity and store.
    pub fn participant_with_identity(
        &self,
        name: &str,
        identity: Arc<Secp256k1Identity>,
        store: StorageProvider,
    ) -> Participant {
        let recovery = SocialRecovery::new(
            identity.clone(),
            store,
            self.transport.clone(),
            self.config.clone(),
        );
        Participant {
            name: name.to_owned(),
            identity,
            recovery,
            cursor: AtomicUsize::new(0),
            transport: Arc::clone(&self.transport),
        }
    }

    /// Add a participant with a new identity.
    pub fn participant_with_store(
        &self,
        name: &str,
        store: StorageProvider,
    ) -> Participant {
        self.participant_with_identity(
            name,
            Arc::new(Secp256k1Identity::new_random()),
            store,
        )
    }
}

/// Device taking part in a test.
pub struct Participant {
    /// Name used in logs.
    pub name: String,
    /// Identity of the device.
    pub identity: Arc<Secp256k1Identity>,
    /// Recovery engine of the device.
    pub recovery: SocialRecovery,
    cursor: AtomicUsize,
    transport: Arc<MemoryTransport>,
}

impl Participant {
    /// Public key of the participant.
    pub fn public_key(&self) -> keyward_core::PublicKey {
        self.identity.public_key()
    }

    /// Apply events addressed to this participant that were
    /// published since the last call.
    pub async fn sync(&self) -> Vec<EventOutcome> {
        let events = self.transport.events().await;
        let start = self.cursor.swap(events.len(), Ordering::SeqCst);
        let mut outcomes = Vec::new();
        for event in events.iter().skip(start) {
            if event.envelope.recipient == self.public_key() {
                outcomes.push(self.recovery.handle_event(event).await);
            }
        }
        tracing::debug!(
            name = %self.name,
            applied = outcomes.len(),
            "test_utils::sync");
        outcomes
    }

    /// Apply one event again.
    pub async fn replay(&self, event: &TransportEvent) -> EventOutcome {
        self.recovery.handle_event(event).await
    }

    /// Events addressed to this participant.
    pub async fn inbox(&self) -> Vec<TransportEvent> {
        let key = self.public_key();
        self.transport
            .events()
            .await
            .into_iter()
            .filter(|e| e.envelope.recipient == key)
            .collect()
    }
}

/// Sync participants until no new events are published.
pub async fn sync_all(participants: &[&Participant]) {
    loop {
        let mut applied = 0;
        for participant in participants {
            applied += participant.sync().await.len();
        }
        if applied == 0 {
            break;
        }
    }
}

/// Create an active vault owned by `owner` with one keyed
/// trustee per participant.
pub async fn create_vault(
    owner: &Participant,
    trustees: &[&Participant],
    threshold: u8,
) -> Result<VaultId> {
    let vault_id = VaultId::new_v4();
    let trustees: Vec<Trustee> = trustees
        .iter()
        .map(|p| Trustee::new_with_key(p.name.clone(), p.public_key()))
        .collect();
    owner
        .recovery
        .configurations()
        .create(
            owner.public_key(),
            vault_id,
            format!("{} vault", owner.name),
            threshold,
            trustees.len() as u8,
            trustees,
            relays()?,
        )
        .await?;
    Ok(vault_id)
}

/// Distribute [SECRET] and let every participant apply the
/// resulting events.
pub async fn distribute_and_sync(
    owner: &Participant,
    trustees: &[&Participant],
    vault_id: &VaultId,
) -> Result<Vec<DeliveryResult>> {
    let results = owner
        .recovery
        .distributor()
        .distribute_secret(vault_id, SECRET)
        .await?;
    let mut participants = vec![owner];
    participants.extend_from_slice(trustees);
    sync_all(&participants).await;
    Ok(results)
}
