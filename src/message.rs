//! Message encryption keyed from the store.
//!
//! A message key is a key record whose private data is a JSON string holding
//! the Base64 of 32 random bytes (see [`generate_key`]). Messages are sealed
//! with XChaCha20-Poly1305 under that key; the message metadata is bound as
//! associated data, so a ciphertext only opens for the sender it names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::codec::{base64, utf8};
use crate::crypto::{self, Context, SecretKey, KEY_LEN, Nonce};
use crate::error::{KeyStoreError, Result};
use crate::store::{KeyStore, SaveKeys};

/// Associated data of a message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Key ID of the message key, usually the sender.
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SealedMessage {
    pub nonce: Nonce,
    #[serde(with = "base64::as_string")]
    pub ciphertext: Vec<u8>,
}

/// Generate private data for a new message key.
pub fn generate_key(ctx: &Context) -> Result<Value> {
    let key = ctx.random_key()?;
    Ok(Value::String(base64::encode(&key[..])))
}

pub struct MessageCipher {
    ctx: Context,
}

impl MessageCipher {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn seal<S: SaveKeys>(
        &self,
        store: &KeyStore<S>,
        message: &str,
        metadata: &MessageMetadata,
        password: &[u8],
    ) -> Result<SealedMessage> {
        let key = message_key(store, &metadata.username, password)?;
        let aad = associated_data(metadata)?;
        let plaintext = Zeroizing::new(utf8::encode(message.encode_utf16())?);

        let nonce = self.ctx.random_nonce()?;
        let ciphertext = crypto::encrypt(&key, &nonce, &plaintext, &aad)?;
        Ok(SealedMessage { nonce, ciphertext })
    }

    /// # Errors
    ///
    /// [`KeyStoreError::Authentication`] if the ciphertext, nonce or metadata
    /// differ from what was sealed.
    pub fn open<S: SaveKeys>(
        &self,
        store: &KeyStore<S>,
        sealed: &SealedMessage,
        metadata: &MessageMetadata,
        password: &[u8],
    ) -> Result<String> {
        let key = message_key(store, &metadata.username, password)?;
        let aad = associated_data(metadata)?;

        let plaintext = crypto::decrypt(&key, &sealed.nonce, &sealed.ciphertext, &aad)?;
        utf8::decode(&plaintext).map_err(|e| {
            tracing::error!("authenticated message is not valid utf-8");
            KeyStoreError::Format(e.to_string())
        })
    }
}

fn associated_data(metadata: &MessageMetadata) -> Result<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(|e| KeyStoreError::Format(e.to_string()))
}

fn message_key<S: SaveKeys>(store: &KeyStore<S>, id: &str, password: &[u8]) -> Result<SecretKey> {
    let data = store.private_key_data(id, password)?;
    let not_a_key =
        || KeyStoreError::InvalidParameters(format!("key '{id}' does not hold a message key"));

    let encoded = data.as_str().ok_or_else(not_a_key)?;
    let bytes = Zeroizing::new(base64::decode(encoded)?);
    let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| not_a_key())?;
    Ok(Zeroizing::new(key))
}
