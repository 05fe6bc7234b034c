//! Persistent storage for recovery records.
//!
//! Records are stored as opaque bytes under a [StoreKey]; the
//! [JsonStore] extension reads and writes serde values on top of
//! any [PersistentStore].
//!
//! Two providers are included, [MemoryStore] for tests and
//! ephemeral use and [FileStore] which writes one JSON document
//! per record below a root directory.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod file;
mod memory;

pub use error::Error;
pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, sync::Arc};

/// Result type for the storage library.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared storage provider.
pub type StorageProvider = Arc<dyn PersistentStore + Send + Sync + 'static>;

/// Collections of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Backup configurations keyed by vault.
    BackupConfiguration,
    /// Invitation links keyed by invite code.
    Invitation,
    /// Recovery requests created by the local participant
    /// keyed by request identifier.
    RecoveryRequest,
    /// Recovery requests received by the local trustee
    /// keyed by request identifier.
    IncomingRecoveryRequest,
    /// Shares held by the local trustee keyed by vault.
    HeldShare,
}

impl Namespace {
    /// Name of the namespace used by storage providers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackupConfiguration => "backup-configuration",
            Self::Invitation => "invitation",
            Self::RecoveryRequest => "recovery-request",
            Self::IncomingRecoveryRequest => "incoming-recovery-request",
            Self::HeldShare => "held-share",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key for a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    /// Collection of the record.
    pub namespace: Namespace,
    /// Identifier of the record within the collection.
    pub id: String,
}

impl StoreKey {
    /// Create a store key.
    ///
    /// Identifiers may only contain ASCII alphanumerics, `-` and `_`
    /// so they are safe to use as file names.
    pub fn new(namespace: Namespace, id: impl ToString) -> Result<Self> {
        let id = id.to_string();
        if id.is_empty()
            || id.len() > 128
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidKey(id));
        }
        Ok(Self { namespace, id })
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// Byte oriented key-value storage.
///
/// Writes replace the whole record; callers that need
/// read-modify-write semantics serialize access themselves.
#[async_trait]
pub trait PersistentStore {
    /// Read a record.
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>>;

    /// Write a record.
    async fn set(&self, key: &StoreKey, value: Vec<u8>) -> Result<()>;

    /// Remove a record, returns whether the record existed.
    async fn remove(&self, key: &StoreKey) -> Result<bool>;

    /// Identifiers of all records in a namespace.
    async fn list(&self, namespace: Namespace) -> Result<Vec<String>>;
}

/// JSON helpers for storage providers.
#[async_trait]
pub trait JsonStore {
    /// Read and decode a record.
    async fn read_json<T>(&self, key: &StoreKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Encode and write a record.
    async fn write_json<T>(&self, key: &StoreKey, value: &T) -> Result<()>
    where
        T: Serialize + Sync;

    /// Read and decode every record in a namespace.
    async fn read_all_json<T>(&self, namespace: Namespace) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send;
}

#[async_trait]
impl<S> JsonStore for S
where
    S: PersistentStore + ?Sized + Send + Sync,
{
    async fn read_json<T>(&self, key: &StoreKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(buffer) => Ok(Some(serde_json::from_slice(&buffer)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T>(&self, key: &StoreKey, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let buffer = serde_json::to_vec_pretty(value)?;
        self.set(key, buffer).await
    }

    async fn read_all_json<T>(&self, namespace: Namespace) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut records = Vec::new();
        for id in self.list(namespace).await? {
            let key = StoreKey::new(namespace, id)?;
            if let Some(record) = self.read_json(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
