use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use keyring::Entry;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const SERVICE_NAME: &str = "com.hospreg.client";
const MASTER_KEY_FILE: &str = "secret.key";
const ACCOUNT_PREFIX: &str = "hospreg-";
const FALLBACK_DIR: &str = "secrets";
const FALLBACK_EXTENSION: &str = ".json";

/// Reference to a persisted secret, allowing retrieval from the backing store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum SecretReference {
    /// Secret is stored in the host operating system's secure keyring.
    Keyring { account: String },
    /// Secret is sealed inline with the local master key.
    LocalEncrypted { nonce: String, ciphertext: String },
}

/// Which backend a [`SecretVault`] tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretBackend {
    /// OS keyring, mirrored to an encrypted file so a missing keyring entry is recoverable.
    #[default]
    Keyring,
    /// Never touch the keyring; seal secrets with the local master key only.
    LocalOnly,
}

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("keyring operation failed: {0}")]
    Keyring(String),
    #[error("local encryption failed: {0}")]
    Crypto(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct FallbackSecret {
    nonce: String,
    ciphertext: String,
}

/// Seals credentials (the session token) next to a data directory.
#[derive(Debug, Clone)]
pub struct SecretVault {
    dir: PathBuf,
    backend: SecretBackend,
}

impl SecretVault {
    pub fn new(dir: impl Into<PathBuf>, backend: SecretBackend) -> Self {
        Self {
            dir: dir.into(),
            backend,
        }
    }

    pub fn backend(&self) -> SecretBackend {
        self.backend
    }

    /// Persist a secret using the most secure backend available.
    pub fn store(&self, label: &str, secret: &str) -> Result<SecretReference, SecretStoreError> {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(SecretStoreError::Crypto(
                "cannot store empty secret".to_string(),
            ));
        }

        if self.backend == SecretBackend::Keyring {
            let account = format!("{ACCOUNT_PREFIX}{label}");
            match Entry::new(SERVICE_NAME, &account) {
                Ok(entry) => match entry.set_password(trimmed) {
                    Ok(()) => {
                        if let Err(err) = self.store_fallback(label, trimmed) {
                            warn!(label, error = %err, "Failed to mirror secret to encrypted fallback");
                        }
                        return Ok(SecretReference::Keyring { account });
                    }
                    Err(err) => {
                        warn!(label, error = %err, "keyring set_password failed; sealing locally");
                    }
                },
                Err(err) => {
                    warn!(label, error = %err, "keyring unavailable; sealing locally");
                }
            }
        }

        let (nonce, ciphertext) = self.encrypt(trimmed.as_bytes())?;
        if let Err(err) = self.delete_fallback(label) {
            debug!(label, error = %err, "Failed to remove stale fallback secret");
        }
        Ok(SecretReference::LocalEncrypted {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Retrieve a secret based on the stored reference.
    pub fn load(&self, reference: &SecretReference) -> Result<Option<String>, SecretStoreError> {
        match reference {
            SecretReference::Keyring { account } => {
                let label = label_from_account(account);
                let entry = match Entry::new(SERVICE_NAME, account) {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(label, error = %err, "keyring unavailable; trying encrypted fallback");
                        return self.load_fallback(label);
                    }
                };
                match entry.get_password() {
                    Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
                    Ok(_) | Err(keyring::Error::NoEntry) => self.load_fallback(label),
                    Err(err) => match self.load_fallback(label)? {
                        Some(secret) => Ok(Some(secret)),
                        None => Err(SecretStoreError::Keyring(err.to_string())),
                    },
                }
            }
            SecretReference::LocalEncrypted { nonce, ciphertext } => {
                let nonce_bytes = STANDARD.decode(nonce)?;
                let cipher_bytes = STANDARD.decode(ciphertext)?;
                let plaintext = self.decrypt(&nonce_bytes, &cipher_bytes)?;
                Ok(Some(String::from_utf8_lossy(&plaintext).to_string()))
            }
        }
    }

    /// Delete a secret from its backing store.
    pub fn delete(&self, reference: &SecretReference) -> Result<(), SecretStoreError> {
        match reference {
            SecretReference::Keyring { account } => {
                let label = label_from_account(account);
                match Entry::new(SERVICE_NAME, account) {
                    Ok(entry) => match entry.delete_credential() {
                        Ok(()) | Err(keyring::Error::NoEntry) => {}
                        Err(err) => return Err(SecretStoreError::Keyring(err.to_string())),
                    },
                    Err(err) => return Err(SecretStoreError::Keyring(err.to_string())),
                }
                self.delete_fallback(label)
            }
            SecretReference::LocalEncrypted { .. } => Ok(()),
        }
    }

    fn fallback_path(&self, label: &str) -> PathBuf {
        self.dir
            .join(FALLBACK_DIR)
            .join(format!("{label}{FALLBACK_EXTENSION}"))
    }

    fn store_fallback(&self, label: &str, secret: &str) -> Result<(), SecretStoreError> {
        let (nonce, ciphertext) = self.encrypt(secret.as_bytes())?;
        let payload = FallbackSecret {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        };
        let path = self.fallback_path(label);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(&payload)?)?;
        Ok(())
    }

    fn load_fallback(&self, label: &str) -> Result<Option<String>, SecretStoreError> {
        let raw = match fs::read_to_string(self.fallback_path(label)) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SecretStoreError::Io(err)),
        };
        let payload: FallbackSecret = serde_json::from_str(&raw)?;
        let nonce_bytes = STANDARD.decode(payload.nonce)?;
        let cipher_bytes = STANDARD.decode(payload.ciphertext)?;
        let plaintext = self.decrypt(&nonce_bytes, &cipher_bytes)?;
        Ok(Some(String::from_utf8_lossy(&plaintext).to_string()))
    }

    fn delete_fallback(&self, label: &str) -> Result<(), SecretStoreError> {
        match fs::remove_file(self.fallback_path(label)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SecretStoreError::Io(err)),
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; 12], Vec<u8>), SecretStoreError> {
        let key = self.master_key()?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))?;

        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))?;
        Ok((nonce_bytes, ciphertext))
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        if nonce.len() != 12 {
            return Err(SecretStoreError::Crypto(
                "invalid nonce length for chacha20poly1305".to_string(),
            ));
        }
        let key = self.master_key()?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))
    }

    fn master_key(&self) -> Result<[u8; 32], SecretStoreError> {
        let path = self.dir.join(MASTER_KEY_FILE);
        if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return Ok(key);
            }
            warn!(
                path = %path.display(),
                length = bytes.len(),
                "master key had unexpected length; regenerating"
            );
        }

        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        fs::create_dir_all(&self.dir)?;
        write_key_file(&path, &key)?;
        Ok(key)
    }
}

fn label_from_account(account: &str) -> &str {
    account.strip_prefix(ACCOUNT_PREFIX).unwrap_or(account)
}

fn write_key_file(path: &Path, key: &[u8]) -> Result<(), SecretStoreError> {
    let mut file = fs::File::create(path)?;
    file.write_all(key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
