use crate::{Namespace, PersistentStore, Result, StoreKey};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = "json";

/// Store records as files below a root directory.
///
/// Each namespace is a directory and each record a file named
/// after the record identifier. Writes go to a temporary file
/// which is renamed over the target so a record is never
/// partially written.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at a directory.
    ///
    /// The directory is created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    fn record_path(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.namespace_dir(key.namespace).join(&key.id);
        path.set_extension(EXTENSION);
        path
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(key);
        match tokio::fs::read(&path).await {
            Ok(buffer) => Ok(Some(buffer)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &StoreKey, value: Vec<u8>) -> Result<()> {
        let dir = self.namespace_dir(key.namespace);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.record_path(key);
        let temp = dir.join(format!(".{}.tmp", key.id));
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&value).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &path).await?;

        tracing::trace!(key = %key, len = value.len(), "file_store::set");
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool> {
        let path = self.record_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>> {
        let dir = self.namespace_dir(namespace);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
