//! Cooperative portal client
//!
//! Command-line host for the credential security layer:
//! 1. Loads configuration and opens the encrypted vault (one store per process)
//! 2. Sweeps expired credentials
//! 3. Runs one command: login, logout, status, cleanup, or an authenticated request
//!
//! Requests go through the authenticated pipeline, which renews the stored
//! credential pair on 401 and replays the request once.

mod cli;
mod config;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use session::{AuthenticatedPipeline, CredentialFacade, FacadeConfig, HttpRenewer, PipelineState};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ApiRequest, HttpTransport};
use vault::{
    AesGcmProvider, EncryptedItemStore, FilePersistence, KeyValuePersistence, StoreConfig,
    WriteOutcome,
};

use crate::cli::Command;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr so command output on stdout stays clean.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let invocation = cli::Invocation::parse();

    // Install before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    let config_path = Config::resolve_path(invocation.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        namespace = %config.vault.namespace,
        vault = %config.vault_path().display(),
        "configuration loaded"
    );

    let portal = Portal::open(&config).await?;
    let result = portal.run(invocation.command).await;

    if invocation.metrics {
        eprintln!("{}", prometheus.render());
    }

    println!("{}", result?);
    Ok(())
}

/// Everything a command needs, wired once at startup.
struct Portal {
    store: Arc<EncryptedItemStore>,
    facade: Arc<CredentialFacade>,
    pipeline: AuthenticatedPipeline,
    vault_path: PathBuf,
}

impl Portal {
    /// Open the file-backed vault under `config.vault.dir`.
    async fn open(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.vault.dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create vault directory {}",
                    config.vault.dir.display()
                )
            })?;

        let vault_path = config.vault_path();
        let persistence = FilePersistence::load(vault_path.clone())
            .await
            .with_context(|| format!("failed to open vault at {}", vault_path.display()))?;

        Ok(Self::with_persistence(config, Arc::new(persistence), vault_path).await)
    }

    async fn with_persistence(
        config: &Config,
        persistence: Arc<dyn KeyValuePersistence>,
        vault_path: PathBuf,
    ) -> Self {
        let store = Arc::new(
            EncryptedItemStore::open(
                persistence,
                Arc::new(AesGcmProvider),
                StoreConfig {
                    namespace: config.vault.namespace.clone(),
                    ..StoreConfig::default()
                },
            )
            .await,
        );

        let evicted = store.cleanup().await;
        info!(evicted, "startup credential cleanup done");

        let facade = Arc::new(CredentialFacade::new(
            store.clone(),
            FacadeConfig {
                access_ttl: config.access_ttl(),
                refresh_ttl: config.refresh_ttl(),
            },
        ));

        let client = reqwest::Client::new();
        let transport = Arc::new(HttpTransport::new(
            client.clone(),
            config.api.base_url.clone(),
            config.timeout(),
        ));
        let renewer = Arc::new(HttpRenewer::new(
            client,
            &config.api.base_url,
            &config.api.renewal_path,
            config.timeout(),
        ));
        let pipeline = AuthenticatedPipeline::new(transport, renewer, facade.clone());

        Self {
            store,
            facade,
            pipeline,
            vault_path,
        }
    }

    /// Run one command and return its stdout text.
    async fn run(&self, command: Command) -> Result<String> {
        match command {
            Command::Login { access, refresh } => {
                match self.facade.set_pair(&access, &refresh).await {
                    WriteOutcome::Encrypted => Ok("signed in".into()),
                    WriteOutcome::Plaintext => Ok(
                        "signed in (warning: credentials stored without encryption)".into(),
                    ),
                    WriteOutcome::Dropped => bail!(
                        "could not store credentials in {}",
                        self.vault_path.display()
                    ),
                }
            }
            Command::Logout => {
                self.facade.clear_tokens().await;
                Ok("signed out".into())
            }
            Command::Status => self.status().await,
            Command::Cleanup => {
                let evicted = self.store.cleanup().await;
                Ok(format!("evicted {evicted} expired credential(s)"))
            }
            Command::Get { path } => self.request(ApiRequest::get(path)).await,
            Command::Post { path, body } => self.request(ApiRequest::post(path, body)).await,
        }
    }

    async fn status(&self) -> Result<String> {
        let state = match self.pipeline.state().await {
            PipelineState::Idle => "idle",
            PipelineState::Renewing => "renewing",
        };
        let status = serde_json::json!({
            "namespace": self.store.namespace(),
            "vault": self.vault_path.display().to_string(),
            "encryption": self.store.encryption_available().await,
            "key_fingerprint": self.store.key_fingerprint().await,
            "access_token": self.facade.get_token().await.is_some(),
            "refresh_token": self.facade.get_refresh_token().await.is_some(),
            "pipeline": state,
        });
        serde_json::to_string_pretty(&status).context("failed to render status")
    }

    async fn request(&self, request: ApiRequest) -> Result<String> {
        match self.pipeline.dispatch(request).await {
            Ok(response) if response.is_success() => Ok(response.body),
            Ok(response) => bail!("portal returned {}: {}", response.status, response.body),
            Err(e) if e.is_session_expired() => {
                Err(anyhow::Error::new(e).context("session expired, please sign in again"))
            }
            Err(e) => Err(anyhow::Error::new(e).context("portal request failed")),
        }
    }
}
