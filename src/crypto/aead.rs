use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use serde_json::Value;
use zeroize::Zeroizing;

use super::{KEY_LEN, Nonce};
use crate::codec::utf8;
use crate::error::{KeyStoreError, Result};

/// Encrypt plaintext, binding `aad` as associated data.
///
/// Returns ciphertext with the tag appended.
pub fn encrypt(key: &[u8; KEY_LEN], nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .encrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| KeyStoreError::Encryption)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// Every failure, whether a bad tag or a ciphertext too short to hold one,
/// is reported as the same [`KeyStoreError::Authentication`].
pub fn decrypt(
    key: &[u8; KEY_LEN],
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| KeyStoreError::Authentication)?;
    Ok(Zeroizing::new(plaintext))
}

/// Serialize a record payload to canonical JSON text and encrypt it.
pub fn seal_value(value: &Value, nonce: &Nonce, key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let text = Zeroizing::new(
        serde_json::to_string(value).map_err(|e| KeyStoreError::Format(e.to_string()))?,
    );
    let data = Zeroizing::new(utf8::encode(text.encode_utf16())?);
    encrypt(key, nonce, &data, &[])
}

/// Decrypt a record payload and parse it back into structured data.
///
/// A payload that authenticates but does not parse is a [`KeyStoreError::Format`].
pub fn open_value(ciphertext: &[u8], nonce: &Nonce, key: &[u8; KEY_LEN]) -> Result<Value> {
    let data = decrypt(key, nonce, ciphertext, &[])?;

    let text = Zeroizing::new(utf8::decode(&data).map_err(|e| {
        tracing::error!("authenticated record payload is not valid utf-8");
        KeyStoreError::Format(e.to_string())
    })?);

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!("authenticated record payload is not valid json");
        KeyStoreError::Format(e.to_string())
    })
}
