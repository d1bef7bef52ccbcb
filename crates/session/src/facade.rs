//! Named accessors for the session credential pair
//!
//! The access token and refresh token are stored as two independent items in
//! the `EncryptedItemStore`, always encrypted and always durable. A pair
//! lock makes `set_pair`/`clear_tokens` atomic with respect to every read,
//! so nobody sees a new access token next to an old refresh token.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vault::{
    ACCESS_TOKEN_KEY, DEFAULT_TTL, EncryptedItemStore, REFRESH_TOKEN_KEY, SetOptions,
    WriteOutcome,
};

/// Default lifetimes for the two credential halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacadeConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_TTL,
            refresh_ttl: DEFAULT_TTL,
        }
    }
}

/// Both halves of a session credential, redacted in Debug output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

/// Credential accessors over a shared store.
pub struct CredentialFacade {
    store: Arc<EncryptedItemStore>,
    config: FacadeConfig,
    pair_lock: RwLock<()>,
}

impl CredentialFacade {
    pub fn new(store: Arc<EncryptedItemStore>, config: FacadeConfig) -> Self {
        Self {
            store,
            config,
            pair_lock: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &Arc<EncryptedItemStore> {
        &self.store
    }

    pub async fn get_token(&self) -> Option<String> {
        let _guard = self.pair_lock.read().await;
        self.store.get_item(ACCESS_TOKEN_KEY, false).await
    }

    /// Store the access token. `ttl` defaults to the configured access TTL.
    pub async fn set_token(&self, value: &str, ttl: Option<Duration>) -> WriteOutcome {
        let _guard = self.pair_lock.write().await;
        let ttl = ttl.unwrap_or(self.config.access_ttl);
        self.store
            .set_item(ACCESS_TOKEN_KEY, value, SetOptions::default().ttl(ttl))
            .await
    }

    pub async fn get_refresh_token(&self) -> Option<String> {
        let _guard = self.pair_lock.read().await;
        self.store.get_item(REFRESH_TOKEN_KEY, false).await
    }

    /// Store the refresh token. `ttl` defaults to the configured refresh TTL.
    pub async fn set_refresh_token(&self, value: &str, ttl: Option<Duration>) -> WriteOutcome {
        let _guard = self.pair_lock.write().await;
        let ttl = ttl.unwrap_or(self.config.refresh_ttl);
        self.store
            .set_item(REFRESH_TOKEN_KEY, value, SetOptions::default().ttl(ttl))
            .await
    }

    /// Remove both halves together.
    pub async fn clear_tokens(&self) {
        let _guard = self.pair_lock.write().await;
        self.store.remove_item(ACCESS_TOKEN_KEY, false).await;
        self.store.remove_item(REFRESH_TOKEN_KEY, false).await;
        info!("session credentials cleared");
    }

    /// Replace both halves as one unit.
    ///
    /// If either write is dropped, both halves are removed rather than leaving
    /// a mixed pair behind, and `Dropped` is returned.
    pub async fn set_pair(&self, access: &str, refresh: &str) -> WriteOutcome {
        let _guard = self.pair_lock.write().await;

        let access_outcome = self
            .store
            .set_item(
                ACCESS_TOKEN_KEY,
                access,
                SetOptions::default().ttl(self.config.access_ttl),
            )
            .await;
        let refresh_outcome = self
            .store
            .set_item(
                REFRESH_TOKEN_KEY,
                refresh,
                SetOptions::default().ttl(self.config.refresh_ttl),
            )
            .await;

        match (access_outcome, refresh_outcome) {
            (WriteOutcome::Encrypted, WriteOutcome::Encrypted) => {
                debug!("credential pair stored");
                WriteOutcome::Encrypted
            }
            (WriteOutcome::Dropped, _) | (_, WriteOutcome::Dropped) => {
                warn!("credential pair write failed, removing both halves");
                self.store.remove_item(ACCESS_TOKEN_KEY, false).await;
                self.store.remove_item(REFRESH_TOKEN_KEY, false).await;
                WriteOutcome::Dropped
            }
            _ => {
                warn!("credential pair stored without encryption");
                WriteOutcome::Plaintext
            }
        }
    }

    /// Both halves, or `None` unless both are present.
    pub async fn get_pair(&self) -> Option<CredentialPair> {
        let _guard = self.pair_lock.read().await;
        let access = self.store.get_item(ACCESS_TOKEN_KEY, false).await?;
        let refresh = self.store.get_item(REFRESH_TOKEN_KEY, false).await?;
        Some(CredentialPair {
            access: Secret::new(access),
            refresh: Secret::new(refresh),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault::{
        AesGcmProvider, KeyValuePersistence, ManualClock, MemoryPersistence, PersistFuture,
        StoreConfig, TracingObserver, UnavailableCrypto,
    };

    /// Memory persistence that refuses writes to the refresh-token record.
    #[derive(Default)]
    struct RefreshWritesFail {
        inner: MemoryPersistence,
    }

    impl KeyValuePersistence for RefreshWritesFail {
        fn get<'a>(&'a self, key: &'a str) -> PersistFuture<'a, Option<String>> {
            self.inner.get(key)
        }

        fn set<'a>(&'a self, key: &'a str, value: String) -> PersistFuture<'a, ()> {
            if key.ends_with(REFRESH_TOKEN_KEY) {
                return Box::pin(async { Err(vault::Error::Persistence("disk full".into())) });
            }
            self.inner.set(key, value)
        }

        fn remove<'a>(&'a self, key: &'a str) -> PersistFuture<'a, ()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> PersistFuture<'_, Vec<String>> {
            self.inner.keys()
        }
    }

    async fn facade_with(config: FacadeConfig) -> (CredentialFacade, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = EncryptedItemStore::open(
            Arc::new(MemoryPersistence::new()),
            Arc::new(AesGcmProvider),
            StoreConfig {
                namespace: "member-42".into(),
                clock: clock.clone(),
                observer: Arc::new(TracingObserver),
            },
        )
        .await;
        (CredentialFacade::new(Arc::new(store), config), clock)
    }

    async fn facade() -> (CredentialFacade, Arc<ManualClock>) {
        facade_with(FacadeConfig::default()).await
    }

    #[tokio::test]
    async fn half_written_pair_is_removed_entirely() {
        let store = EncryptedItemStore::open(
            Arc::new(RefreshWritesFail::default()),
            Arc::new(AesGcmProvider),
            StoreConfig::default(),
        )
        .await;
        let facade = CredentialFacade::new(Arc::new(store), FacadeConfig::default());

        assert_eq!(
            facade.set_pair("at_new", "rt_new").await,
            WriteOutcome::Dropped
        );
        assert!(facade.get_token().await.is_none());
        assert!(facade.get_refresh_token().await.is_none());
        assert!(facade.get_pair().await.is_none());
    }

    #[tokio::test]
    async fn token_accessors_roundtrip() {
        let (facade, _) = facade().await;
        assert!(facade.get_token().await.is_none());
        assert!(facade.get_refresh_token().await.is_none());

        assert_eq!(
            facade.set_token("at_1", None).await,
            WriteOutcome::Encrypted
        );
        assert_eq!(
            facade.set_refresh_token("rt_1", None).await,
            WriteOutcome::Encrypted
        );

        assert_eq!(facade.get_token().await.as_deref(), Some("at_1"));
        assert_eq!(facade.get_refresh_token().await.as_deref(), Some("rt_1"));
    }

    #[tokio::test]
    async fn explicit_ttl_overrides_default() {
        let (facade, clock) = facade().await;
        facade
            .set_token("at_short", Some(Duration::from_secs(60)))
            .await;
        facade.set_refresh_token("rt_long", None).await;

        clock.advance(Duration::from_secs(120));
        assert!(facade.get_token().await.is_none());
        assert_eq!(facade.get_refresh_token().await.as_deref(), Some("rt_long"));
    }

    #[tokio::test]
    async fn halves_use_independent_ttls() {
        let (facade, clock) = facade_with(FacadeConfig {
            access_ttl: Duration::from_secs(300),
            refresh_ttl: Duration::from_secs(3600),
        })
        .await;
        facade.set_pair("at", "rt").await;

        clock.advance(Duration::from_secs(600));
        assert!(facade.get_token().await.is_none());
        assert_eq!(facade.get_refresh_token().await.as_deref(), Some("rt"));
        assert!(facade.get_pair().await.is_none());
    }

    #[tokio::test]
    async fn clear_tokens_removes_both() {
        let (facade, _) = facade().await;
        facade.set_pair("at", "rt").await;

        facade.clear_tokens().await;
        assert!(facade.get_token().await.is_none());
        assert!(facade.get_refresh_token().await.is_none());
    }

    #[tokio::test]
    async fn set_pair_overwrites_both_halves() {
        let (facade, _) = facade().await;
        facade.set_pair("at_old", "rt_old").await;

        assert_eq!(facade.set_pair("at_new", "rt_new").await, WriteOutcome::Encrypted);
        let pair = facade.get_pair().await.unwrap();
        assert_eq!(pair.access.expose(), "at_new");
        assert_eq!(pair.refresh.expose(), "rt_new");
    }

    #[tokio::test]
    async fn pair_debug_is_redacted() {
        let (facade, _) = facade().await;
        facade.set_pair("at_visible", "rt_visible").await;

        let debug = format!("{:?}", facade.get_pair().await.unwrap());
        assert!(!debug.contains("at_visible"));
        assert!(!debug.contains("rt_visible"));
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_mixed_pair() {
        let (facade, _) = facade().await;
        let facade = Arc::new(facade);
        facade.set_pair("at_0", "rt_0").await;

        let writer = {
            let facade = facade.clone();
            tokio::spawn(async move {
                for i in 1..=20 {
                    facade.set_pair(&format!("at_{i}"), &format!("rt_{i}")).await;
                }
            })
        };
        let mut readers = Vec::new();
        for _ in 0..4 {
            let facade = facade.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..20 {
                    if let Some(pair) = facade.get_pair().await {
                        let a = pair.access.expose().trim_start_matches("at_").to_string();
                        let r = pair.refresh.expose().trim_start_matches("rt_").to_string();
                        assert_eq!(a, r, "mixed pair observed");
                    }
                }
            }));
        }

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
    }

    #[tokio::test]
    async fn pair_without_crypto_reports_plaintext() {
        let store = EncryptedItemStore::open(
            Arc::new(MemoryPersistence::new()),
            Arc::new(UnavailableCrypto),
            StoreConfig::default(),
        )
        .await;
        let facade = CredentialFacade::new(Arc::new(store), FacadeConfig::default());

        assert_eq!(facade.set_pair("at", "rt").await, WriteOutcome::Plaintext);
        assert_eq!(facade.get_token().await.as_deref(), Some("at"));
    }
}
