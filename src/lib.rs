//! File-backed key store.
//!
//! Each key record keeps its private data encrypted with a key derived from a
//! password (PBKDF2-HMAC-SHA-256 over a per-record nonce) and sealed with
//! XChaCha20-Poly1305. Public data is stored alongside in the clear.
//!
//! ```no_run
//! use pwkeystore::{Context, KeyStore, Storage, StoreOptions};
//! use serde_json::json;
//!
//! # fn main() -> pwkeystore::Result<()> {
//! let ctx = Context::init()?;
//! let storage = Storage::new("keyfile.json".into());
//! let mut store = KeyStore::open(ctx, storage, StoreOptions::default())?;
//!
//! store.save_key("alice", b"pw", &json!({"secret": "s"}), Some(&json!({"pub": 1})))?;
//! assert_eq!(store.private_key_data("alice", b"pw")?, json!({"secret": "s"}));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod crypto;
mod error;
pub mod format;
pub mod message;
mod record;
mod storage;
mod store;

pub use crate::crypto::{Context, DEFAULT_ITERATIONS, Nonce};
pub use crate::error::{CodecError, KeyStoreError, PersistError, Result};
pub use crate::record::{KeyRecord, KeysData, Metadata};
pub use crate::storage::Storage;
pub use crate::store::{KeyEntry, KeyStore, SaveKeys, StoreOptions};

use directories::ProjectDirs;

/// File name of the key file in the platform data directory.
pub const DEFAULT_KEYFILE: &str = "keyfile.json";

/// Storage at the platform data directory, used when no key file is configured.
pub fn default_storage() -> anyhow::Result<Storage> {
    let project_dirs = ProjectDirs::from("", "", "pwkeystore")
        .ok_or_else(|| anyhow::anyhow!("could not determine platform directories"))?;

    let path = project_dirs.data_dir().join(DEFAULT_KEYFILE);

    Ok(Storage::new(path))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    use super::*;

    fn options() -> StoreOptions {
        StoreOptions::new(1000).unwrap()
    }

    fn open(storage: &Storage) -> KeyStore<Storage> {
        KeyStore::open(Context::init().unwrap(), storage.clone(), options()).unwrap()
    }

    #[test]
    fn open_missing_file_gives_empty_store() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("keyfile.json"));

        let store = open(&storage);

        assert!(store.key_ids().is_empty());
        assert!(!storage.exists());
    }

    #[test]
    fn saved_keys_survive_reopen() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("keyfile.json"));

        let mut store = open(&storage);
        store
            .save_key("alice", b"pw", &json!({"secret": "s"}), Some(&json!({"pub": 1})))
            .unwrap();
        drop(store);

        let store = open(&storage);
        assert_eq!(store.key_ids(), vec!["alice"]);
        assert_eq!(store.private_key_data("alice", b"pw").unwrap(), json!({"secret": "s"}));
        assert_eq!(store.public_key_data("alice").unwrap(), Some(&json!({"pub": 1})));
    }

    #[test]
    fn wrong_password_fails_after_reopen() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("keyfile.json"));

        open(&storage)
            .save_key("alice", b"correct", &json!({"secret": "s"}), None)
            .unwrap();

        assert!(matches!(
            open(&storage).private_key_data("alice", b"wrong"),
            Err(KeyStoreError::Authentication)
        ));
    }

    #[test]
    fn plaintext_never_reaches_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile.json");
        let storage = Storage::new(path.clone());

        open(&storage)
            .save_key("alice", b"pw", &json!({"secret": "very-private"}), None)
            .unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("alice"));
        assert!(!content.contains("very-private"));
    }

    #[test]
    fn removal_and_public_updates_are_persisted() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("keyfile.json"));

        let mut store = open(&storage);
        store.save_key("alice", b"pw", &json!("a"), None).unwrap();
        store.save_key("bob", b"pw", &json!("b"), None).unwrap();
        store.save_public_key_data("bob", Some(json!({"pub": "b"}))).unwrap();
        store.remove_key("alice").unwrap();

        let store = open(&storage);
        assert_eq!(store.key_ids(), vec!["bob"]);
        assert_eq!(store.public_key_data("bob").unwrap(), Some(&json!({"pub": "b"})));
    }

    #[test]
    fn null_public_data_matches_after_reopen() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("keyfile.json"));

        let mut store = open(&storage);
        store
            .save_key("alice", b"pw", &json!(1), Some(&serde_json::Value::Null))
            .unwrap();
        let before = store.raw_key_data("alice").unwrap().clone();

        let reopened = open(&storage);
        assert_eq!(reopened.raw_key_data("alice").unwrap(), &before);
        assert_eq!(reopened.public_key_data("alice").unwrap(), None);
    }

    #[test]
    fn failed_batch_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile.json");
        let storage = Storage::new(path.clone());

        let mut store = open(&storage);
        store.save_key("alice", b"pw", &json!("a"), None).unwrap();
        let before = fs::read(&path).unwrap();

        let value = json!("b");
        let result = store.save_keys(&[
            KeyEntry { id: "bob", password: b"pw", private_data: &value, public_data: None },
            KeyEntry { id: "carol", password: &[0xc0], private_data: &value, public_data: None },
        ]);

        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(store.key_ids(), vec!["alice"]);
    }

    #[test]
    fn reads_file_written_by_other_tools() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile.json");
        let storage = Storage::new(path.clone());

        open(&storage).save_key("alice", b"pw", &json!([1, 2]), None).unwrap();

        // re-serialize through a generic JSON value, as another writer would
        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();

        assert_eq!(open(&storage).private_key_data("alice", b"pw").unwrap(), json!([1, 2]));
    }
}
