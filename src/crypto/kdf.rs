use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{KEY_LEN, SecretKey};
use crate::error::{KeyStoreError, Result};

/// PBKDF2 rounds used for new records unless the store is configured otherwise.
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Upper bound on PBKDF2 rounds, for new records and for records read from a
/// key file. Bounds the work one decrypt can be made to do.
pub const MAX_ITERATIONS: u32 = 10_000_000;

pub fn validate_iterations(iterations: u32) -> Result<()> {
    if !(1..=MAX_ITERATIONS).contains(&iterations) {
        return Err(KeyStoreError::InvalidParameters(format!(
            "pbkdf2 iterations must be between 1 and {MAX_ITERATIONS}, got {iterations}"
        )));
    }
    Ok(())
}

/// Derive a record key from a password with PBKDF2-HMAC-SHA-256.
///
/// The record nonce doubles as the salt.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<SecretKey> {
    validate_iterations(iterations)?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key[..]);

    Ok(key)
}
