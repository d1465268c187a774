use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

const DOCUMENT_SUFFIX: &str = ".json";
const BACKUP_DIR: &str = "backup";
const MAX_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration '{0}' not found")]
    NotFound(String),
    #[error("invalid configuration id '{0}'")]
    InvalidId(String),
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("stored configuration '{id}' is not valid JSON: {source}")]
    Serialization {
        id: String,
        source: serde_json::Error,
    },
}

/// Persistence for microservice definition documents, keyed by id.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persists a new document under a fresh id.
    async fn save(&self, document: Value) -> Result<String, StoreError>;

    async fn update(&self, id: &str, document: Value) -> Result<(), StoreError>;

    /// Removes a document, archiving its last content first.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Value, StoreError>;

    async fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Ids of all stored documents, sorted.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One `<id>.json` file per document; deleted documents are copied to
/// `backup/<id>.json` first.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let backup_dir = root.join(BACKUP_DIR);
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|source| StoreError::Io {
                action: "create store directory",
                path: backup_dir.clone(),
                source,
            })?;
        info!("opened configuration store path={}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last archived content of a deleted document.
    pub async fn read_backup(&self, id: &str) -> Result<Value, StoreError> {
        validate_id(id)?;
        let path = self.backup_path(id);
        read_document(id, &path).await
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{DOCUMENT_SUFFIX}"))
    }

    fn backup_path(&self, id: &str) -> PathBuf {
        self.root
            .join(BACKUP_DIR)
            .join(format!("{id}{DOCUMENT_SUFFIX}"))
    }

    async fn is_committed(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.document_path(id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| StoreError::Io {
                action: "inspect",
                path,
                source,
            })
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn save(&self, document: Value) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut id = new_id();
        while self.is_committed(&id).await? {
            id = new_id();
        }
        write_document(&id, &self.document_path(&id), &document).await?;
        debug!("saved configuration id={id}");
        Ok(id)
    }

    async fn update(&self, id: &str, document: Value) -> Result<(), StoreError> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        if !self.is_committed(id).await? {
            return Err(StoreError::NotFound(id.to_string()));
        }
        write_document(id, &self.document_path(id), &document).await?;
        debug!("updated configuration id={id}");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        let path = self.document_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path,
                    source,
                });
            }
        };
        write_bytes(&self.backup_path(id), &bytes).await?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| StoreError::Io {
                action: "remove",
                path: path.clone(),
                source,
            })?;
        info!("deleted configuration id={id} backup={}", self.backup_path(id).display());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Value, StoreError> {
        validate_id(id)?;
        read_document(id, &self.document_path(id)).await
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        if validate_id(id).is_err() {
            return Ok(false);
        }
        self.is_committed(id).await
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let io_error = |source| StoreError::Io {
            action: "list",
            path: self.root.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(id) = name.strip_suffix(DOCUMENT_SUFFIX) else {
                continue;
            };
            if name.starts_with('.') || validate_id(id).is_err() {
                continue;
            }
            if entry.file_type().await.map_err(io_error)?.is_file() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn read_document(id: &str, path: &Path) -> Result<Value, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Err(source) => {
            return Err(StoreError::Io {
                action: "read",
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
        id: id.to_string(),
        source,
    })
}

async fn write_document(id: &str, path: &Path, document: &Value) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(document).map_err(|source| {
        StoreError::Serialization {
            id: id.to_string(),
            source,
        }
    })?;
    write_bytes(path, &bytes).await
}

/// Writes to a hidden sibling temp file, then renames it over `path`.
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Io {
                action: "create directory",
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|source| StoreError::Io {
            action: "write",
            path: temp_path.clone(),
            source,
        })?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|source| StoreError::Io {
            action: "rename",
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<String, Value>,
    backups: BTreeMap<String, Value>,
}

/// In-process store with the same contract as [`FileStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn backup(&self, id: &str) -> Option<Value> {
        self.state.read().await.backups.get(id).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn save(&self, document: Value) -> Result<String, StoreError> {
        let mut state = self.state.write().await;
        let mut id = new_id();
        while state.documents.contains_key(&id) {
            id = new_id();
        }
        state.documents.insert(id.clone(), document);
        Ok(id)
    }

    async fn update(&self, id: &str, document: Value) -> Result<(), StoreError> {
        validate_id(id)?;
        let mut state = self.state.write().await;
        let Some(slot) = state.documents.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        *slot = document;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        let mut state = self.state.write().await;
        let Some(previous) = state.documents.remove(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        state.backups.insert(id.to_string(), previous);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Value, StoreError> {
        validate_id(id)?;
        self.state
            .read()
            .await
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.state.read().await.documents.contains_key(id))
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.read().await.documents.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_plain_file_name_tokens() {
        assert!(validate_id("3f2c9a1e-0000-4000-8000-000000000000").is_ok());
        assert!(validate_id("orders_v2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id(".hidden").is_err());
        assert!(validate_id(&"x".repeat(MAX_ID_LEN + 1)).is_err());
    }
}
