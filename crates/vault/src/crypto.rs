//! Symmetric crypto primitives behind a provider trait
//!
//! `AesGcmProvider` is the production adapter: AES-256-GCM with a fresh
//! random 96-bit nonce per call, nonce prepended to the ciphertext+tag.
//! `UnavailableCrypto` stands in for a platform without usable primitives;
//! every operation fails, and the store degrades to plaintext.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use common::Secret;
use rand::RngExt;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::constants::{KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{Error, Result};

/// Opaque symmetric key handle.
///
/// The raw bytes are redacted in Debug output and zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle(Secret<Vec<u8>>);

impl KeyHandle {
    /// Wrap raw key bytes. Adapters validate length in `import_key`.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        Self(Secret::new(raw))
    }

    /// Raw key bytes, for provider adapters only.
    pub fn raw(&self) -> &[u8] {
        self.0.expose()
    }

    /// First 8 bytes of SHA-256 over the key, hex encoded.
    ///
    /// Identifies which key is loaded in logs without revealing it.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.raw());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Key generation and authenticated encryption.
pub trait CryptoProvider: Send + Sync {
    /// Identifier for logging (e.g. "aes-256-gcm")
    fn id(&self) -> &str;

    fn generate_key(&self) -> Result<KeyHandle>;

    fn import_key(&self, raw: &[u8]) -> Result<KeyHandle>;

    fn export_key(&self, key: &KeyHandle) -> Result<Vec<u8>>;

    /// Returns `nonce ‖ ciphertext+tag`.
    fn encrypt(&self, key: &KeyHandle, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Accepts the output of `encrypt`. Any tampering fails tag verification.
    fn decrypt(&self, key: &KeyHandle, payload: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM via the `aes-gcm` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmProvider;

impl AesGcmProvider {
    fn cipher(key: &KeyHandle) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key.raw())
            .map_err(|e| Error::EncryptionUnavailable(format!("failed to create cipher: {e}")))
    }
}

impl CryptoProvider for AesGcmProvider {
    fn id(&self) -> &str {
        "aes-256-gcm"
    }

    fn generate_key(&self) -> Result<KeyHandle> {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill(&mut bytes);
        let key = KeyHandle::from_raw(bytes.to_vec());
        bytes.zeroize();
        Ok(key)
    }

    fn import_key(&self, raw: &[u8]) -> Result<KeyHandle> {
        if raw.len() != KEY_LEN {
            return Err(Error::EncryptionUnavailable(format!(
                "key material must be {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        Ok(KeyHandle::from_raw(raw.to_vec()))
    }

    fn export_key(&self, key: &KeyHandle) -> Result<Vec<u8>> {
        Ok(key.raw().to_vec())
    }

    fn encrypt(&self, key: &KeyHandle, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;

        // Never reuse a nonce under the same key
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::EncryptionUnavailable(format!("encryption failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    fn decrypt(&self, key: &KeyHandle, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailed(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        }
        let cipher =
            Self::cipher(key).map_err(|e| Error::DecryptionFailed(e.to_string()))?;
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::DecryptionFailed(format!("wrong key or tampered data: {e}")))
    }
}

/// Provider for platforms without usable crypto primitives.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCrypto;

impl UnavailableCrypto {
    fn unavailable<T>() -> Result<T> {
        Err(Error::EncryptionUnavailable(
            "no crypto provider on this platform".into(),
        ))
    }
}

impl CryptoProvider for UnavailableCrypto {
    fn id(&self) -> &str {
        "unavailable"
    }

    fn generate_key(&self) -> Result<KeyHandle> {
        Self::unavailable()
    }

    fn import_key(&self, _raw: &[u8]) -> Result<KeyHandle> {
        Self::unavailable()
    }

    fn export_key(&self, _key: &KeyHandle) -> Result<Vec<u8>> {
        Self::unavailable()
    }

    fn encrypt(&self, _key: &KeyHandle, _plaintext: &[u8]) -> Result<Vec<u8>> {
        Self::unavailable()
    }

    fn decrypt(&self, _key: &KeyHandle, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(Error::DecryptionFailed(
            "no crypto provider on this platform".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> KeyHandle {
        AesGcmProvider.generate_key().unwrap()
    }

    #[test]
    fn roundtrip_returns_plaintext() {
        let key = key();
        let long = "x".repeat(4096);
        for plaintext in ["", "at_member_42", "ключ-🔑", long.as_str()] {
            let payload = AesGcmProvider.encrypt(&key, plaintext.as_bytes()).unwrap();
            let decrypted = AesGcmProvider.decrypt(&key, &payload).unwrap();
            assert_eq!(decrypted, plaintext.as_bytes());
        }
    }

    #[test]
    fn payload_is_nonce_plus_ciphertext_and_tag() {
        let payload = AesGcmProvider.encrypt(&key(), b"secret").unwrap();
        assert_eq!(payload.len(), NONCE_LEN + b"secret".len() + TAG_LEN);
    }

    #[test]
    fn nonces_differ_per_call() {
        let key = key();
        let a = AesGcmProvider.encrypt(&key, b"same").unwrap();
        let b = AesGcmProvider.encrypt(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let payload = AesGcmProvider.encrypt(&key(), b"secret").unwrap();
        let err = AesGcmProvider.decrypt(&key(), &payload).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn flipped_byte_fails_tag_check() {
        let key = key();
        let mut payload = AesGcmProvider.encrypt(&key, b"secret").unwrap();
        payload[NONCE_LEN] ^= 0x01;
        assert!(AesGcmProvider.decrypt(&key, &payload).is_err());
    }

    #[test]
    fn truncated_payload_fails() {
        let err = AesGcmProvider.decrypt(&key(), &[0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("too short"), "got: {err}");
    }

    #[test]
    fn import_rejects_wrong_length() {
        assert!(AesGcmProvider.import_key(&[0u8; 16]).is_err());
        assert!(AesGcmProvider.import_key(&[0u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn export_then_import_keeps_key_usable() {
        let original = key();
        let raw = AesGcmProvider.export_key(&original).unwrap();
        let imported = AesGcmProvider.import_key(&raw).unwrap();

        let payload = AesGcmProvider.encrypt(&original, b"meter-7").unwrap();
        assert_eq!(AesGcmProvider.decrypt(&imported, &payload).unwrap(), b"meter-7");
    }

    #[test]
    fn generated_keys_are_distinct() {
        assert_ne!(key(), key());
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let key = KeyHandle::from_raw(vec![0u8; KEY_LEN]);
        assert_eq!(key.fingerprint().len(), 16);
        assert_eq!(key.fingerprint(), key.clone().fingerprint());
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let key = KeyHandle::from_raw(vec![0xAB; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn unavailable_provider_fails_everything() {
        assert!(UnavailableCrypto.generate_key().is_err());
        assert!(UnavailableCrypto.import_key(&[0u8; KEY_LEN]).is_err());
        let key = KeyHandle::from_raw(vec![0u8; KEY_LEN]);
        assert!(matches!(
            UnavailableCrypto.encrypt(&key, b"x"),
            Err(Error::EncryptionUnavailable(_))
        ));
        assert!(matches!(
            UnavailableCrypto.decrypt(&key, b"x"),
            Err(Error::DecryptionFailed(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn any_string_survives_encryption(plaintext in proptest::prelude::any::<String>()) {
            let key = key();
            let payload = AesGcmProvider.encrypt(&key, plaintext.as_bytes()).unwrap();
            proptest::prop_assert_eq!(payload.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
            let decrypted = AesGcmProvider.decrypt(&key, &payload).unwrap();
            proptest::prop_assert_eq!(decrypted, plaintext.into_bytes());
        }
    }
}
