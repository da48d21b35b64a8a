//! Generation, persistence and retrieval of the database key.
//!
//! The stored entry has the form `v1.<device-tag>.<base64 key>`. The key is
//! derived once with HKDF-SHA256 from fresh random material, salted with the
//! device digest, and never re-derived afterwards: later runs read it back
//! verbatim.

use crate::{DeviceIdentity, SecureStorage, StorageError, DATABASE_KEY_ACCOUNT};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

const FORMAT_VERSION: &str = "v1";
const HKDF_INFO: &[u8] = b"deskvault-database-key-v1";

/// Errors from the key lifecycle. All of them are fatal for opening the store.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("secret store unavailable: {0}")]
    Unavailable(#[from] StorageError),

    #[error("stored key is corrupted: {0}")]
    Corrupted(String),

    #[error("stored key belongs to another device")]
    DeviceMismatch,

    #[error("key derivation failed")]
    Derivation,
}

pub type KeyResult<T> = Result<T, KeyError>;

/// A 256-bit symmetric key. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// What the secret store currently holds, without exposing the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Present,
    ForeignDevice,
    Corrupted,
}

/// Owns the device-bound database key.
pub struct KeyManager {
    storage: Box<dyn SecureStorage>,
    device: DeviceIdentity,
}

impl KeyManager {
    pub fn new(storage: Box<dyn SecureStorage>, device: DeviceIdentity) -> Self {
        Self { storage, device }
    }

    /// Key manager over the platform secret store for the current device.
    pub fn platform() -> KeyResult<Self> {
        let storage = crate::create_storage(crate::SERVICE_NAME)?;
        Ok(Self::new(storage, DeviceIdentity::current()))
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    /// Return the stored key, generating and persisting one on first run.
    pub fn get_or_create_key(&self) -> KeyResult<EncryptionKey> {
        if let Some(key) = self.load_key()? {
            debug!("Loaded database key from secret store");
            return Ok(key);
        }

        let key = self.derive_fresh_key()?;
        self.storage
            .set(DATABASE_KEY_ACCOUNT, &self.encode(&key))?;

        // Read back so a store that silently drops writes fails now, not on next start.
        match self.load_key()? {
            Some(stored) if stored == key => {
                info!(device_tag = %self.device.tag(), "Generated new database key");
                Ok(key)
            }
            _ => Err(KeyError::Corrupted(
                "secret store did not persist the new key".to_string(),
            )),
        }
    }

    /// Read the stored key. `None` when no entry exists.
    pub fn load_key(&self) -> KeyResult<Option<EncryptionKey>> {
        match self.storage.get(DATABASE_KEY_ACCOUNT)? {
            Some(entry) => self.decode(&entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn status(&self) -> KeyResult<KeyStatus> {
        match self.load_key() {
            Ok(Some(_)) => Ok(KeyStatus::Present),
            Ok(None) => Ok(KeyStatus::Missing),
            Err(KeyError::DeviceMismatch) => Ok(KeyStatus::ForeignDevice),
            Err(KeyError::Corrupted(_)) => Ok(KeyStatus::Corrupted),
            Err(e) => Err(e),
        }
    }

    /// Remove the stored key. Data encrypted with it becomes unreadable.
    pub fn delete_key(&self) -> KeyResult<bool> {
        let removed = self.storage.delete(DATABASE_KEY_ACCOUNT)?;
        if removed {
            warn!("Deleted database key from secret store");
        }
        Ok(removed)
    }

    fn derive_fresh_key(&self) -> KeyResult<EncryptionKey> {
        let mut material = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut material);

        let salt = self.device.digest();
        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &material);
        let mut okm = [0u8; KEY_LEN];
        hkdf.expand(HKDF_INFO, &mut okm)
            .map_err(|_| KeyError::Derivation)?;
        Ok(EncryptionKey(okm))
    }

    fn encode(&self, key: &EncryptionKey) -> String {
        format!(
            "{}.{}.{}",
            FORMAT_VERSION,
            self.device.tag(),
            BASE64.encode(key.as_bytes())
        )
    }

    fn decode(&self, entry: &str) -> KeyResult<EncryptionKey> {
        let mut parts = entry.trim().splitn(3, '.');
        let (version, tag, encoded) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(t), Some(k)) => (v, t, k),
            _ => return Err(KeyError::Corrupted("unrecognised entry format".to_string())),
        };

        if version != FORMAT_VERSION {
            return Err(KeyError::Corrupted(format!("unsupported version {version}")));
        }
        if tag != self.device.tag() {
            return Err(KeyError::DeviceMismatch);
        }

        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| KeyError::Corrupted(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| KeyError::Corrupted(format!("expected {KEY_LEN} bytes, got {}", v.len())))?;
        Ok(EncryptionKey(bytes))
    }
}
