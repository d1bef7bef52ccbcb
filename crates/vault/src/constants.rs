//! Fixed identifiers and defaults for the credential vault

use std::time::Duration;

/// Record name of the access token (bearer credential).
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Record name of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Records swept by `EncryptedItemStore::cleanup`.
pub const WELL_KNOWN_KEYS: &[&str] = &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY];

/// Persistence identifier of the raw key bytes. Deliberately outside any
/// identity namespace so clearing an identity never destroys the key.
pub const KEY_MATERIAL_ID: &str = "vault.encryption-key";

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Item lifetime when the caller does not pass one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Identity namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";
