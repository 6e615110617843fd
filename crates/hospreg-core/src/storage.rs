//! Synchronous key/value persistence used by the session store and the
//! environment resolver.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::secret_store::{SecretBackend, SecretReference, SecretStoreError, SecretVault};

const STORAGE_FILE_NAME: &str = "storage.json";

/// Keys persisted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Token,
    User,
    UserInfo,
    Account,
    ServerMode,
}

impl StorageKey {
    pub const ALL: [StorageKey; 5] = [
        StorageKey::Token,
        StorageKey::User,
        StorageKey::UserInfo,
        StorageKey::Account,
        StorageKey::ServerMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Token => "token",
            StorageKey::User => "user",
            StorageKey::UserInfo => "userInfo",
            StorageKey::Account => "account",
            StorageKey::ServerMode => "serverMode",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed storage document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("secret storage error: {0}")]
    Secret(#[from] SecretStoreError),
}

/// Host persistence API: absent keys read as `None`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;
    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key);
        Ok(())
    }
}

/// JSON document on disk. The token never lands in the document in the
/// clear; it is sealed through a [`SecretVault`] and only the reference is kept.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    vault: SecretVault,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>, backend: SecretBackend) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(STORAGE_FILE_NAME),
            vault: SecretVault::new(dir, backend),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "Ignoring unreadable storage document");
                Ok(Map::new())
            }
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(document)?)?;
        Ok(())
    }

    fn token_reference(value: Option<&Value>) -> Option<SecretReference> {
        value.and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let document = self.read_document()?;
        let entry = document.get(key.as_str());
        if key == StorageKey::Token {
            return match Self::token_reference(entry) {
                Some(reference) => Ok(self.vault.load(&reference)?),
                None => Ok(None),
            };
        }
        Ok(entry.and_then(Value::as_str).map(str::to_string))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        let stored = if key == StorageKey::Token {
            if let Some(previous) = Self::token_reference(document.get(key.as_str())) {
                if let Err(err) = self.vault.delete(&previous) {
                    warn!(error = %err, "Failed to remove previous token");
                }
            }
            serde_json::to_value(self.vault.store(key.as_str(), value)?)?
        } else {
            Value::String(value.to_string())
        };
        document.insert(key.as_str().to_string(), stored);
        self.write_document(&document)
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        let Some(previous) = document.remove(key.as_str()) else {
            return Ok(());
        };
        self.write_document(&document)?;
        if key == StorageKey::Token
            && let Some(reference) = Self::token_reference(Some(&previous))
            && let Err(err) = self.vault.delete(&reference)
        {
            warn!(error = %err, "Failed to remove stored token secret");
        }
        Ok(())
    }
}
