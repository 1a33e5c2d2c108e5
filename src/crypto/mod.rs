//! Cryptographic primitives for the key store.
//!
//! Provides the crypto context, password-based key derivation and
//! authenticated encryption of record payloads.

pub mod aead;
pub mod kdf;

use std::fmt;

use getrandom::fill;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use zeroize::Zeroizing;

use crate::codec::base64;
use crate::error::{KeyStoreError, Result};

pub use aead::{decrypt, encrypt, open_value, seal_value};
pub use kdf::{DEFAULT_ITERATIONS, MAX_ITERATIONS, derive_key};

/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Symmetric key material, derived or random. Wiped on drop.
pub type SecretKey = Zeroizing<[u8; KEY_LEN]>;

/// Initialized crypto context.
///
/// Obtained once from [`Context::init`] and passed to everything that needs
/// fresh randomness. Holding one means the OS random generator answered.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    _private: (),
}

impl Context {
    pub fn init() -> Result<Self> {
        let mut probe = [0u8; 1];
        secure_random(&mut probe)?;
        tracing::debug!("crypto context initialized");
        Ok(Self { _private: () })
    }

    /// Generate a fresh nonce
    pub fn random_nonce(&self) -> Result<Nonce> {
        let mut nonce = [0u8; NONCE_LEN];
        secure_random(&mut nonce)?;
        Ok(Nonce(nonce))
    }

    /// Generate a fresh symmetric key
    pub fn random_key(&self) -> Result<SecretKey> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        secure_random(&mut key[..])?;
        Ok(key)
    }
}

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| KeyStoreError::Random)
}

/// A 24-byte nonce, stored as Base64 in JSON.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl From<[u8; NONCE_LEN]> for Nonce {
    fn from(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Nonce {
    type Error = KeyStoreError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let nonce: [u8; NONCE_LEN] = bytes.try_into().map_err(|_| {
            KeyStoreError::InvalidParameters(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(nonce))
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", base64::encode(&self.0))
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = base64::decode(&s).map_err(D::Error::custom)?;
        Nonce::try_from(bytes.as_slice()).map_err(D::Error::custom)
    }
}
