//! Lifecycle of the single symmetric key protecting stored items
//!
//! `initialize()` loads the persisted key bytes, or generates and persists a
//! fresh key on first run. Every failure along the way is non-fatal: the
//! manager ends up with no key, reports `EncryptionUnavailable` to the
//! observer, and the store falls back to plaintext items.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::constants::KEY_MATERIAL_ID;
use crate::crypto::{CryptoProvider, KeyHandle};
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::persistence::KeyValuePersistence;

/// Owns the key handle used by `EncryptedItemStore`.
pub struct CryptoKeyManager {
    persistence: Arc<dyn KeyValuePersistence>,
    crypto: Arc<dyn CryptoProvider>,
    observer: Arc<dyn Observer>,
    key: RwLock<Option<KeyHandle>>,
}

impl CryptoKeyManager {
    pub fn new(
        persistence: Arc<dyn KeyValuePersistence>,
        crypto: Arc<dyn CryptoProvider>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            persistence,
            crypto,
            observer,
            key: RwLock::new(None),
        }
    }

    /// Load or generate the key. Returns whether a key is now available.
    pub async fn initialize(&self) -> bool {
        match self.load_or_generate().await {
            Ok(key) => {
                info!(
                    provider = self.crypto.id(),
                    fingerprint = %key.fingerprint(),
                    "encryption key ready"
                );
                *self.key.write().await = Some(key);
                true
            }
            Err(e) => {
                let unavailable = match e {
                    Error::EncryptionUnavailable(_) => e,
                    other => Error::EncryptionUnavailable(other.to_string()),
                };
                self.observer.report(None, &unavailable);
                *self.key.write().await = None;
                false
            }
        }
    }

    /// Current key handle, or `None` when encryption is unavailable.
    pub async fn get_key(&self) -> Option<KeyHandle> {
        self.key.read().await.clone()
    }

    pub async fn fingerprint(&self) -> Option<String> {
        self.key.read().await.as_ref().map(KeyHandle::fingerprint)
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    async fn load_or_generate(&self) -> Result<KeyHandle> {
        if let Some(record) = self.persistence.get(KEY_MATERIAL_ID).await? {
            // Raw bytes as a JSON numeric array
            let raw: Vec<u8> = serde_json::from_str(&record)
                .map_err(|e| Error::RecordParse(format!("key material record: {e}")))?;
            return self.crypto.import_key(&raw);
        }

        let key = self.crypto.generate_key()?;
        let raw = self.crypto.export_key(&key)?;
        let record = serde_json::to_string(&raw)
            .map_err(|e| Error::RecordParse(format!("serializing key material: {e}")))?;
        self.persistence.set(KEY_MATERIAL_ID, record).await?;
        info!(fingerprint = %key.fingerprint(), "generated new encryption key");
        Ok(key)
    }
}
