//! Error types for the key store.

use thiserror::Error;

/// Malformed encoded data. Always deterministic, never worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("base64: incorrect padding")]
    InvalidPadding,

    #[error("base64: incorrect characters for decoding")]
    InvalidCharacter,

    #[error("utf8: invalid source encoding")]
    InvalidUtf8,

    #[error("utf8: invalid string")]
    InvalidUtf16,
}

/// Failure writing or reading the persisted snapshot.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed key file: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Tag verification failed. Deliberately carries no detail.
    #[error("invalid password or corrupted data")]
    Authentication,

    #[error("key '{0}' not found")]
    NotFound(String),

    #[error("failed to persist key store: {0}")]
    Persistence(#[from] PersistError),

    #[error("authenticated payload is not valid data: {0}")]
    Format(String),

    #[error("encryption failed")]
    Encryption,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("random generator unavailable")]
    Random,
}

pub type Result<T> = std::result::Result<T, KeyStoreError>;
