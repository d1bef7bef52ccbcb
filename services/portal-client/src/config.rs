//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials never live in the TOML; they are handed to `login` and kept
//! in the encrypted vault.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

/// Portal API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path of the credential renewal endpoint, relative to `base_url`
    #[serde(default = "default_renewal_path")]
    pub renewal_path: String,
}

/// Credential vault settings
#[derive(Debug, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_dir")]
    pub dir: PathBuf,
    /// Identity whose credentials this host manages
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_ttl")]
    pub refresh_ttl_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            dir: default_vault_dir(),
            namespace: default_namespace(),
            access_ttl_secs: default_ttl(),
            refresh_ttl_secs: default_ttl(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_renewal_path() -> String {
    "/token/refresh/".into()
}

fn default_vault_dir() -> PathBuf {
    PathBuf::from(".coop-portal")
}

fn default_namespace() -> String {
    vault::DEFAULT_NAMESPACE.into()
}

fn default_ttl() -> u64 {
    vault::DEFAULT_TTL.as_secs()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `COOP_PORTAL_BASE_URL` replaces `api.base_url` when set.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("COOP_PORTAL_BASE_URL") {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.api.renewal_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "renewal_path must start with '/', got: {}",
                self.api.renewal_path
            )));
        }

        if self.vault.namespace.trim().is_empty() {
            return Err(common::Error::Config(
                "vault namespace must not be empty".into(),
            ));
        }

        if self.vault.access_ttl_secs == 0 || self.vault.refresh_ttl_secs == 0 {
            return Err(common::Error::Config(
                "credential TTLs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("coop-portal.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.vault.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.vault.refresh_ttl_secs)
    }

    /// File holding key material and credential records.
    pub fn vault_path(&self) -> PathBuf {
        self.vault.dir.join("vault.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("coop-portal.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn minimal_toml() -> &'static str {
        r#"
[api]
base_url = "https://portal.example.coop/api"
"#
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://portal.example.coop/api");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.renewal_path, "/token/refresh/");
        assert_eq!(config.vault.namespace, "default");
        assert_eq!(config.access_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.refresh_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.vault_path(), PathBuf::from(".coop-portal/vault.json"));
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "http://localhost:8000/api"
timeout_secs = 5
renewal_path = "/auth/renew"

[vault]
dir = "/var/lib/coop-portal"
namespace = "member-42"
access_ttl_secs = 300
refresh_ttl_secs = 604800
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.api.renewal_path, "/auth/renew");
        assert_eq!(config.vault.namespace, "member-42");
        assert_eq!(config.access_ttl(), Duration::from_secs(300));
        assert_eq!(config.refresh_ttl(), Duration::from_secs(604_800));
        assert_eq!(
            config.vault_path(),
            PathBuf::from("/var/lib/coop-portal/vault.json")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/coop-portal.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_base_url_env_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("COOP_PORTAL_BASE_URL", "http://127.0.0.1:9000") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };

        assert_eq!(config.api.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_env_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env("COOP_PORTAL_BASE_URL", "portal.example.coop") };
        let result = Config::load(&path);
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };

        assert!(result.is_err(), "env override must be validated too");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "portal.example.coop"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://portal.example.coop"
timeout_secs = 0
"#,
        );
        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_relative_renewal_path_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://portal.example.coop"
renewal_path = "token/refresh/"
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("renewal_path"), "got: {err}");
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://portal.example.coop"

[vault]
namespace = "  "
"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COOP_PORTAL_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://portal.example.coop"

[vault]
refresh_ttl_secs = 0
"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("coop-portal.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
