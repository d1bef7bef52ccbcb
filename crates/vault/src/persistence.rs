//! Durable key/value persistence behind a small trait
//!
//! `FilePersistence` keeps one JSON object mapping record names to text
//! values. All writes use atomic temp-file + rename so a crash mid-write
//! never leaves a torn file, and a tokio Mutex serializes concurrent writers.
//! `MemoryPersistence` is the same contract over a plain map, for tests and
//! for hosts that deliberately keep nothing on disk.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Boxed future returned by persistence operations.
pub type PersistFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Text records addressed by name.
pub trait KeyValuePersistence: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> PersistFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> PersistFuture<'a, ()>;

    /// Removing a missing record is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> PersistFuture<'a, ()>;

    /// All record names currently stored.
    fn keys(&self) -> PersistFuture<'_, Vec<String>>;
}

/// In-process persistence; contents die with the value.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValuePersistence for MemoryPersistence {
    fn get<'a>(&'a self, key: &'a str) -> PersistFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> PersistFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> PersistFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> PersistFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.keys().cloned().collect()) })
    }
}

/// JSON-file persistence with atomic writes and owner-only permissions.
///
/// The in-memory map mirrors the file; reads never touch disk after `load`.
pub struct FilePersistence {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FilePersistence {
    /// Load records from the given file path.
    ///
    /// If the file doesn't exist it is created as `{}`, so a first run and a
    /// later run go through the same read path. A file that doesn't parse is
    /// moved aside to `<path>.corrupt` and replaced with an empty one; its
    /// credentials are lost and the user has to sign in again.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Persistence(format!("reading vault file: {e}")))?;
            match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(records) => {
                    info!(path = %path.display(), records = records.len(), "loaded vault file");
                    records
                }
                Err(e) => {
                    let aside = corrupt_path(&path);
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "vault file is unreadable, starting empty"
                    );
                    tokio::fs::rename(&path, &aside).await.map_err(|e| {
                        Error::Persistence(format!("moving aside corrupt vault file: {e}"))
                    })?;
                    let records = HashMap::new();
                    write_atomic(&path, &records).await?;
                    records
                }
            }
        } else {
            info!(path = %path.display(), "vault file not found, starting empty");
            let records = HashMap::new();
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValuePersistence for FilePersistence {
    fn get<'a>(&'a self, key: &'a str) -> PersistFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> PersistFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let previous = state.insert(key.to_string(), value);
            if let Err(e) = write_atomic(&self.path, &state).await {
                // Keep memory and disk in agreement
                match previous {
                    Some(old) => state.insert(key.to_string(), old),
                    None => state.remove(key),
                };
                return Err(e);
            }
            debug!(key, "stored record");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> PersistFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(old) = state.remove(key) {
                if let Err(e) = write_atomic(&self.path, &state).await {
                    state.insert(key.to_string(), old);
                    return Err(e);
                }
                debug!(key, "removed record");
            }
            Ok(())
        })
    }

    fn keys(&self) -> PersistFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.state.lock().await.keys().cloned().collect()) })
    }
}

/// `vault.json` -> `vault.json.corrupt`
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

/// Write records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets permissions to 0600 (owner read/write only) since the
/// file holds key material and credentials.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::RecordParse(format!("serializing vault file: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Persistence("vault path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".vault.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing temp vault file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting vault file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("renaming temp vault file: {e}")))?;

    debug!(path = %path.display(), "persisted vault file");
    Ok(())
}
