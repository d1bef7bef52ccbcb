//! Encrypted key/value store with per-item expiration
//!
//! Items live either in the durable per-identity store (a
//! `KeyValuePersistence`, records named `"{namespace}/{key}"`) or in a
//! process-local map. Every item carries an absolute expiry; reads check it
//! lazily and evict on the spot, so correctness never depends on a sweep.
//!
//! Faults never reach callers. An item that has expired, fails to parse, or
//! fails to decrypt (missing key, tampered payload, tag mismatch) is evicted
//! and read as absent, which forces re-authentication instead of crashing
//! the caller. Writes that cannot be encrypted are stored as plaintext and
//! say so in their `WriteOutcome`.
//!
//! Durable record format: `{"value": string, "encrypted": bool, "expiresAt": ms}`.
//! Encrypted values are `base64(nonce ‖ ciphertext+tag)`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_NAMESPACE, DEFAULT_TTL, WELL_KNOWN_KEYS};
use crate::crypto::CryptoProvider;
use crate::error::{Error, Result};
use crate::key_manager::CryptoKeyManager;
use crate::observer::{Observer, TracingObserver};
use crate::persistence::KeyValuePersistence;

/// A single stored value with its protection flag and absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    /// Ciphertext (base64) when `encrypted`, plaintext otherwise
    pub value: String,
    pub encrypted: bool,
    /// Unix timestamp in milliseconds
    pub expires_at: u64,
}

impl StoredItem {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis > self.expires_at
    }
}

/// Options for `set_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    pub encrypt: bool,
    pub ttl: Duration,
    pub memory_only: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            ttl: DEFAULT_TTL,
            memory_only: false,
        }
    }
}

impl SetOptions {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn memory_only(mut self) -> Self {
        self.memory_only = true;
        self
    }

    pub fn plaintext(mut self) -> Self {
        self.encrypt = false;
        self
    }
}

/// What `set_item` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored encrypted
    Encrypted,
    /// Stored as plaintext, either by request or because encryption was unavailable
    Plaintext,
    /// Not stored: the durable write failed
    Dropped,
}

/// Store construction options.
#[derive(Clone)]
pub struct StoreConfig {
    /// Identity whose durable records this store reads and writes
    pub namespace: String,
    pub clock: Arc<dyn Clock>,
    pub observer: Arc<dyn Observer>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }
}

/// Encrypted item store. Construct one per process with `open` and share it
/// by `Arc`.
///
/// A store-wide operation lock makes each public operation atomic with
/// respect to the others, so a read-then-evict can never delete a value
/// written in between.
pub struct EncryptedItemStore {
    namespace: String,
    durable: Arc<dyn KeyValuePersistence>,
    memory: Mutex<HashMap<String, StoredItem>>,
    keys: CryptoKeyManager,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    ops: Mutex<()>,
}

impl EncryptedItemStore {
    /// Build the store and initialize its key (load or generate).
    ///
    /// Never fails: without a usable key the store runs in plaintext mode.
    pub async fn open(
        durable: Arc<dyn KeyValuePersistence>,
        crypto: Arc<dyn CryptoProvider>,
        config: StoreConfig,
    ) -> Self {
        let keys = CryptoKeyManager::new(durable.clone(), crypto, config.observer.clone());
        keys.initialize().await;
        info!(namespace = %config.namespace, "credential store opened");

        Self {
            namespace: config.namespace,
            durable,
            memory: Mutex::new(HashMap::new()),
            keys,
            clock: config.clock,
            observer: config.observer,
            ops: Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether new items can be encrypted.
    pub async fn encryption_available(&self) -> bool {
        self.keys.get_key().await.is_some()
    }

    /// Fingerprint of the loaded key, for status output.
    pub async fn key_fingerprint(&self) -> Option<String> {
        self.keys.fingerprint().await
    }

    /// Store `value` under `key`, expiring `options.ttl` from now.
    pub async fn set_item(&self, key: &str, value: &str, options: SetOptions) -> WriteOutcome {
        let _guard = self.ops.lock().await;

        let ttl_millis = u64::try_from(options.ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = self.clock.now_millis().saturating_add(ttl_millis);

        let encrypted_value = if options.encrypt {
            self.encrypt(key, value).await
        } else {
            None
        };
        let item = match encrypted_value {
            Some(ciphertext) => StoredItem {
                value: ciphertext,
                encrypted: true,
                expires_at,
            },
            None => StoredItem {
                value: value.to_string(),
                encrypted: false,
                expires_at,
            },
        };
        let outcome = if item.encrypted {
            WriteOutcome::Encrypted
        } else {
            WriteOutcome::Plaintext
        };

        if options.memory_only {
            self.memory.lock().await.insert(key.to_string(), item);
        } else if let Err(e) = self.write_durable(key, &item).await {
            self.observer.report(Some(key), &e);
            return WriteOutcome::Dropped;
        }

        debug!(key, memory_only = options.memory_only, ?outcome, "stored item");
        outcome
    }

    /// Read `key`, or `None` if missing, expired, or unreadable.
    pub async fn get_item(&self, key: &str, memory_only: bool) -> Option<String> {
        let _guard = self.ops.lock().await;

        let item = self.load(key, memory_only).await?;
        if item.is_expired(self.clock.now_millis()) {
            self.observer.report(Some(key), &Error::Expired);
            self.evict(key, memory_only).await;
            return None;
        }
        if !item.encrypted {
            return Some(item.value);
        }

        match self.decrypt(&item.value).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.observer.report(Some(key), &e);
                self.evict(key, memory_only).await;
                None
            }
        }
    }

    pub async fn remove_item(&self, key: &str, memory_only: bool) {
        let _guard = self.ops.lock().await;
        self.evict(key, memory_only).await;
    }

    /// Remove every item in one placement. Returns the number removed.
    ///
    /// Durable clearing is limited to this store's namespace; the key
    /// material and other identities are untouched.
    pub async fn clear(&self, memory_only: bool) -> usize {
        let _guard = self.ops.lock().await;

        if memory_only {
            let mut memory = self.memory.lock().await;
            let removed = memory.len();
            memory.clear();
            return removed;
        }

        let names = match self.durable.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.observer.report(None, &e);
                return 0;
            }
        };
        let prefix = format!("{}/", self.namespace);
        let mut removed = 0;
        for name in names.iter().filter(|n| n.starts_with(&prefix)) {
            match self.durable.remove(name).await {
                Ok(()) => removed += 1,
                Err(e) => self.observer.report(Some(name), &e),
            }
        }
        removed
    }

    /// Evict expired well-known items from both placements.
    ///
    /// Not scheduled automatically; the host calls it at startup and may
    /// run it periodically. Returns the number of evicted items.
    pub async fn cleanup(&self) -> usize {
        let _guard = self.ops.lock().await;

        let now = self.clock.now_millis();
        let mut evicted = 0;
        for key in WELL_KNOWN_KEYS {
            for memory_only in [false, true] {
                let Some(item) = self.load(key, memory_only).await else {
                    continue;
                };
                if item.is_expired(now) {
                    self.observer.report(Some(key), &Error::Expired);
                    self.evict(key, memory_only).await;
                    evicted += 1;
                }
            }
        }
        info!(evicted, "credential cleanup sweep finished");
        evicted
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}/{}", self.namespace, key)
    }

    async fn write_durable(&self, key: &str, item: &StoredItem) -> Result<()> {
        let record = serde_json::to_string(item)
            .map_err(|e| Error::RecordParse(format!("serializing item: {e}")))?;
        self.durable.set(&self.record_key(key), record).await
    }

    /// Fetch the raw item. Unparseable durable records are evicted.
    async fn load(&self, key: &str, memory_only: bool) -> Option<StoredItem> {
        if memory_only {
            return self.memory.lock().await.get(key).cloned();
        }

        let record = match self.durable.get(&self.record_key(key)).await {
            Ok(record) => record?,
            Err(e) => {
                self.observer.report(Some(key), &e);
                return None;
            }
        };
        match serde_json::from_str(&record) {
            Ok(item) => Some(item),
            Err(e) => {
                self.observer
                    .report(Some(key), &Error::RecordParse(format!("stored item: {e}")));
                self.evict(key, false).await;
                None
            }
        }
    }

    async fn evict(&self, key: &str, memory_only: bool) {
        if memory_only {
            self.memory.lock().await.remove(key);
        } else if let Err(e) = self.durable.remove(&self.record_key(key)).await {
            self.observer.report(Some(key), &e);
        }
    }

    /// Encrypt for storage, or `None` (reported) when that is not possible.
    async fn encrypt(&self, key: &str, value: &str) -> Option<String> {
        let Some(handle) = self.keys.get_key().await else {
            self.observer.report(
                Some(key),
                &Error::EncryptionUnavailable("no encryption key loaded".into()),
            );
            return None;
        };
        match self.keys.crypto().encrypt(&handle, value.as_bytes()) {
            Ok(payload) => Some(BASE64.encode(payload)),
            Err(e) => {
                self.observer.report(Some(key), &e);
                None
            }
        }
    }

    async fn decrypt(&self, payload: &str) -> Result<String> {
        let handle = self
            .keys
            .get_key()
            .await
            .ok_or_else(|| Error::DecryptionFailed("no encryption key loaded".into()))?;
        let bytes = BASE64
            .decode(payload)
            .map_err(|e| Error::DecryptionFailed(format!("payload is not valid base64: {e}")))?;
        let plaintext = self.keys.crypto().decrypt(&handle, &bytes)?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::DecryptionFailed(format!("plaintext is not UTF-8: {e}")))
    }
}
