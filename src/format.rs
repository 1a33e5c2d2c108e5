//! Key file format.
//!
//! A key file is a single JSON object mapping key IDs to records:
//!
//! ```text
//! {
//!   "<keyId>": {
//!     "metadata": { "nonce": "<base64>", "iterations": <integer> },
//!     "public": <any JSON value>,
//!     "private": "<base64 ciphertext+tag>"
//!   }
//! }
//! ```

use crate::crypto::kdf::{MAX_ITERATIONS, validate_iterations};
use crate::error::{KeyStoreError, PersistError, Result};
use crate::record::KeysData;

/// Parses a key file.
///
/// # Errors
///
/// Returns an error if:
/// - The data is not a JSON object of records
/// - A nonce or ciphertext is not valid Base64, or a nonce has the wrong length
/// - A record declares zero iterations or more than [`MAX_ITERATIONS`]
pub fn parse(data: &[u8]) -> Result<KeysData> {
    let keys: KeysData = serde_json::from_slice(data).map_err(PersistError::from)?;

    for (id, record) in &keys {
        let iterations = record.metadata().iterations;
        validate_iterations(iterations).map_err(|_| {
            KeyStoreError::InvalidParameters(format!(
                "key '{id}' declares {iterations} iterations, allowed 1 to {MAX_ITERATIONS}"
            ))
        })?;
    }

    Ok(keys)
}

/// Serializes all records to key file bytes.
pub fn serialize(keys: &KeysData) -> std::result::Result<Vec<u8>, PersistError> {
    Ok(serde_json::to_vec(keys)?)
}
