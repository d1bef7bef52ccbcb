//! Encrypted credential vault
//!
//! Local storage for session credentials with authenticated encryption at
//! rest and per-item expiration. Faults are absorbed and reported to an
//! `Observer`; callers only ever see values or absence.
//!
//! Lifecycle:
//! 1. Host builds a `KeyValuePersistence` (usually `FilePersistence::load()`)
//! 2. `EncryptedItemStore::open()` loads or generates the AES-256-GCM key
//! 3. Items are written with `set_item()` (encrypted, durable, 24h TTL by default)
//! 4. `get_item()` checks expiry lazily and evicts anything expired or unreadable
//! 5. `cleanup()` sweeps the well-known credential records at startup

pub mod clock;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod key_manager;
pub mod observer;
pub mod persistence;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use crypto::{AesGcmProvider, CryptoProvider, KeyHandle, UnavailableCrypto};
pub use error::{Error, Result};
pub use key_manager::CryptoKeyManager;
pub use observer::{Observer, TracingObserver};
pub use persistence::{FilePersistence, KeyValuePersistence, MemoryPersistence, PersistFuture};
pub use store::{EncryptedItemStore, SetOptions, StoreConfig, StoredItem, WriteOutcome};
