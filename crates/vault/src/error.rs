//! Error types for the encrypted item store
//!
//! None of these reach callers of `EncryptedItemStore`: they are absorbed at
//! the storage boundary and handed to the injected `Observer`.

/// Storage and crypto faults.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("item expired")]
    Expired,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("record parse error: {0}")]
    RecordParse(String),
}

impl Error {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EncryptionUnavailable(_) => "encryption_unavailable",
            Error::DecryptionFailed(_) => "decryption_failed",
            Error::Expired => "expired",
            Error::Persistence(_) => "persistence",
            Error::RecordParse(_) => "record_parse",
        }
    }
}

/// Result alias for vault operations.
pub type Result<T> = std::result::Result<T, Error>;
