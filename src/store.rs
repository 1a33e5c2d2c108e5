use serde_json::Value;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::codec::utf8;
use crate::crypto::{self, Context, DEFAULT_ITERATIONS, SecretKey, kdf};
use crate::error::{KeyStoreError, PersistError, Result};
use crate::record::{KeyRecord, KeysData, Metadata};
use crate::storage::Storage;

/// Persistence callback invoked with the full snapshot after every mutation.
///
/// Implemented by [`Storage`] and by any closure
/// `FnMut(&KeysData) -> Result<(), PersistError>`.
pub trait SaveKeys {
    fn save(&mut self, keys: &KeysData) -> std::result::Result<(), PersistError>;
}

impl<F> SaveKeys for F
where
    F: FnMut(&KeysData) -> std::result::Result<(), PersistError>,
{
    fn save(&mut self, keys: &KeysData) -> std::result::Result<(), PersistError> {
        self(keys)
    }
}

/// Store-wide settings applied to newly saved records.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    iterations: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl StoreOptions {
    pub fn new(iterations: u32) -> Result<Self> {
        kdf::validate_iterations(iterations)?;
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

/// One entry of a [`KeyStore::save_keys`] batch.
#[derive(Debug, Clone, Copy)]
pub struct KeyEntry<'a> {
    pub id: &'a str,
    pub password: &'a [u8],
    pub private_data: &'a Value,
    pub public_data: Option<&'a Value>,
}

/// Password-protected key records, flushed through `S` after each change.
///
/// Mutating methods take `&mut self`, so one store has a single writer and
/// every mutation plus its flush runs as one unit.
pub struct KeyStore<S> {
    ctx: Context,
    keys: KeysData,
    save: S,
    options: StoreOptions,
}

impl KeyStore<Storage> {
    /// Opens the key file behind `storage`, treating a missing file as empty.
    pub fn open(ctx: Context, storage: Storage, options: StoreOptions) -> Result<Self> {
        let keys = storage.load()?;
        Ok(Self::new(ctx, storage, keys, options))
    }
}

impl<S: SaveKeys> KeyStore<S> {
    pub fn new(ctx: Context, save: S, initial: KeysData, options: StoreOptions) -> Self {
        Self {
            ctx,
            keys: initial,
            save,
            options,
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Key IDs in ascending order.
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    pub fn public_key_data(&self, id: &str) -> Result<Option<&Value>> {
        Ok(self.record(id)?.public())
    }

    /// Decrypts the private data of `id`.
    ///
    /// # Errors
    ///
    /// [`KeyStoreError::NotFound`] for an unknown ID and
    /// [`KeyStoreError::Authentication`] for a wrong password or a damaged
    /// record.
    pub fn private_key_data(&self, id: &str, password: &[u8]) -> Result<Value> {
        let record = self.record(id)?;
        let key = record_key(password, record.metadata())?;
        crypto::open_value(record.private(), &record.metadata().nonce, &key)
    }

    /// The stored record as is, private data still encrypted.
    pub fn raw_key_data(&self, id: &str) -> Result<&KeyRecord> {
        self.record(id)
    }

    /// Encrypts and stores a key, replacing any record with the same ID,
    /// then flushes.
    ///
    /// If the flush fails the in-memory store already holds the new record
    /// and is ahead of the persisted snapshot.
    pub fn save_key(
        &mut self,
        id: &str,
        password: &[u8],
        private_data: &Value,
        public_data: Option<&Value>,
    ) -> Result<()> {
        let record = self.seal_record(password, private_data, public_data)?;
        self.keys.insert(id.to_string(), record);
        debug!(key = id, "saved key");
        self.flush()
    }

    /// Stores every entry with one flush.
    ///
    /// All records are encrypted before the store is touched; if any entry
    /// fails nothing is applied and nothing is flushed. Later entries win
    /// over earlier ones with the same ID.
    pub fn save_keys(&mut self, batch: &[KeyEntry<'_>]) -> Result<()> {
        let staged = batch
            .iter()
            .map(|entry| {
                self.seal_record(entry.password, entry.private_data, entry.public_data)
                    .map(|record| (entry.id.to_string(), record))
            })
            .collect::<Result<Vec<_>>>()?;

        self.keys.extend(staged);
        debug!(count = batch.len(), "saved key batch");
        self.flush()
    }

    /// Replaces the public data of an existing key.
    ///
    /// Never creates a record: a key without private data would be incomplete.
    pub fn save_public_key_data(&mut self, id: &str, public_data: Option<Value>) -> Result<()> {
        let record = self
            .keys
            .get_mut(id)
            .ok_or_else(|| KeyStoreError::NotFound(id.to_string()))?;
        record.set_public(public_data);
        debug!(key = id, "updated public key data");
        self.flush()
    }

    pub fn remove_key(&mut self, id: &str) -> Result<()> {
        if self.keys.remove(id).is_none() {
            return Err(KeyStoreError::NotFound(id.to_string()));
        }
        debug!(key = id, "removed key");
        self.flush()
    }

    fn record(&self, id: &str) -> Result<&KeyRecord> {
        self.keys
            .get(id)
            .ok_or_else(|| KeyStoreError::NotFound(id.to_string()))
    }

    fn seal_record(
        &self,
        password: &[u8],
        private_data: &Value,
        public_data: Option<&Value>,
    ) -> Result<KeyRecord> {
        let metadata = Metadata {
            nonce: self.ctx.random_nonce()?,
            iterations: self.options.iterations,
        };
        let key = record_key(password, &metadata)?;
        let private = crypto::seal_value(private_data, &metadata.nonce, &key)?;
        Ok(KeyRecord::new(metadata, public_data.cloned(), private))
    }

    fn flush(&mut self) -> Result<()> {
        self.save.save(&self.keys).map_err(|e| {
            warn!(error = %e, "failed to persist key store; memory is ahead of disk");
            KeyStoreError::Persistence(e)
        })
    }
}

/// Derives the key for a record. Passwords must be valid UTF-8.
fn record_key(password: &[u8], metadata: &Metadata) -> Result<SecretKey> {
    let _checked = Zeroizing::new(utf8::decode(password)?);
    crypto::derive_key(password, metadata.nonce.as_bytes(), metadata.iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use serde_json::json;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    const PW: &[u8] = b"correct horse";

    type Snapshots = Rc<RefCell<Vec<KeysData>>>;

    fn recording_store() -> (KeyStore<impl SaveKeys>, Snapshots) {
        let snapshots = Snapshots::default();
        let sink = Rc::clone(&snapshots);
        let save = move |keys: &KeysData| -> std::result::Result<(), PersistError> {
            sink.borrow_mut().push(keys.clone());
            Ok(())
        };
        let store = KeyStore::new(
            Context::init().unwrap(),
            save,
            KeysData::new(),
            StoreOptions::new(1000).unwrap(),
        );
        (store, snapshots)
    }

    fn failing_save(_: &KeysData) -> std::result::Result<(), PersistError> {
        Err(io::Error::other("disk full").into())
    }

    #[test]
    fn save_and_read_back() {
        let (mut store, _) = recording_store();
        store
            .save_key("alice", PW, &json!({"secret": "s"}), Some(&json!({"pub": 1})))
            .unwrap();

        assert_eq!(store.private_key_data("alice", PW).unwrap(), json!({"secret": "s"}));
        assert_eq!(store.public_key_data("alice").unwrap(), Some(&json!({"pub": 1})));
    }

    #[test]
    fn save_without_public_data() {
        let (mut store, _) = recording_store();
        store.save_key("alice", PW, &json!("s"), None).unwrap();
        assert_eq!(store.public_key_data("alice").unwrap(), None);
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let (mut store, _) = recording_store();
        store.save_key("alice", PW, &json!({"secret": "s"}), None).unwrap();

        assert!(matches!(
            store.private_key_data("alice", b"wrong"),
            Err(KeyStoreError::Authentication)
        ));
    }

    #[test]
    fn records_hold_ciphertext_and_metadata() {
        let (mut store, _) = recording_store();
        store.save_key("alice", PW, &json!({"secret": "s"}), None).unwrap();

        let raw = store.raw_key_data("alice").unwrap();
        assert_eq!(raw.metadata().iterations, 1000);
        assert!(!raw.private().windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn each_save_flushes_full_snapshot() {
        let (mut store, snapshots) = recording_store();
        store.save_key("a", PW, &json!(1), None).unwrap();
        store.save_key("b", PW, &json!(2), None).unwrap();

        let snapshots = snapshots.borrow();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].len(), 2);
    }

    #[test]
    fn saving_again_overwrites_with_fresh_nonce() {
        let (mut store, _) = recording_store();
        store.save_key("alice", PW, &json!("old"), Some(&json!("pub"))).unwrap();
        let first = store.raw_key_data("alice").unwrap().clone();

        store.save_key("alice", b"new pw", &json!("new"), None).unwrap();
        let second = store.raw_key_data("alice").unwrap();

        assert_ne!(first.metadata().nonce, second.metadata().nonce);
        assert_eq!(second.public(), None);
        assert_eq!(store.private_key_data("alice", b"new pw").unwrap(), json!("new"));
        assert!(store.private_key_data("alice", PW).is_err());
    }

    #[test]
    fn records_keep_their_own_iterations() {
        let ctx = Context::init().unwrap();
        let mut keys = KeysData::new();
        let mut save = |snapshot: &KeysData| -> std::result::Result<(), PersistError> {
            keys = snapshot.clone();
            Ok(())
        };

        let mut old = KeyStore::new(ctx, &mut save, KeysData::new(), StoreOptions::new(1000).unwrap());
        old.save_key("alice", PW, &json!("s"), None).unwrap();
        drop(old);

        let reopened = KeyStore::new(ctx, failing_save, keys, StoreOptions::new(2000).unwrap());
        assert_eq!(reopened.raw_key_data("alice").unwrap().metadata().iterations, 1000);
        assert_eq!(reopened.private_key_data("alice", PW).unwrap(), json!("s"));
    }

    #[test]
    fn key_ids_are_sorted() {
        let (mut store, _) = recording_store();
        for id in ["charlie", "alice", "bob"] {
            store.save_key(id, PW, &json!(id), None).unwrap();
        }
        assert_eq!(store.key_ids(), vec!["alice", "bob", "charlie"]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (mut store, snapshots) = recording_store();

        assert!(matches!(store.public_key_data("ghost"), Err(KeyStoreError::NotFound(id)) if id == "ghost"));
        assert!(matches!(store.private_key_data("ghost", PW), Err(KeyStoreError::NotFound(_))));
        assert!(matches!(store.raw_key_data("ghost"), Err(KeyStoreError::NotFound(_))));
        assert!(matches!(
            store.save_public_key_data("ghost", Some(json!({}))),
            Err(KeyStoreError::NotFound(_))
        ));
        assert!(matches!(store.remove_key("ghost"), Err(KeyStoreError::NotFound(_))));

        assert!(store.key_ids().is_empty());
        assert!(snapshots.borrow().is_empty());
    }

    #[test]
    fn save_public_key_data_only_touches_public() {
        let (mut store, snapshots) = recording_store();
        store.save_key("alice", PW, &json!("s"), Some(&json!(1))).unwrap();
        let before = store.raw_key_data("alice").unwrap().clone();

        store.save_public_key_data("alice", Some(json!({"pub": 2}))).unwrap();
        let after = store.raw_key_data("alice").unwrap();

        assert_eq!(after.public(), Some(&json!({"pub": 2})));
        assert_eq!(after.metadata(), before.metadata());
        assert_eq!(after.private(), before.private());
        assert_eq!(snapshots.borrow().len(), 2);
    }

    #[test]
    fn remove_key_deletes_and_flushes() {
        let (mut store, snapshots) = recording_store();
        store.save_key("alice", PW, &json!("s"), None).unwrap();
        store.remove_key("alice").unwrap();

        assert!(store.key_ids().is_empty());
        assert!(snapshots.borrow().last().unwrap().is_empty());
    }

    #[test]
    fn batch_applies_all_with_one_flush() {
        let (mut store, snapshots) = recording_store();
        let (a, b) = (json!({"k": "a"}), json!({"k": "b"}));
        let public = json!("pub-b");

        store
            .save_keys(&[
                KeyEntry { id: "a", password: PW, private_data: &a, public_data: None },
                KeyEntry { id: "b", password: b"other", private_data: &b, public_data: Some(&public) },
            ])
            .unwrap();

        assert_eq!(snapshots.borrow().len(), 1);
        assert_eq!(store.private_key_data("a", PW).unwrap(), a);
        assert_eq!(store.private_key_data("b", b"other").unwrap(), b);
        assert_eq!(store.public_key_data("b").unwrap(), Some(&public));
    }

    #[test]
    fn failing_batch_entry_leaves_store_untouched() {
        let (mut store, snapshots) = recording_store();
        store.save_key("a", PW, &json!("original"), None).unwrap();
        let before = store.raw_key_data("a").unwrap().clone();

        let value = json!("replacement");
        let result = store.save_keys(&[
            KeyEntry { id: "a", password: PW, private_data: &value, public_data: None },
            // not UTF-8, rejected before derivation
            KeyEntry { id: "b", password: &[0xff, 0xfe], private_data: &value, public_data: None },
        ]);

        assert!(matches!(result, Err(KeyStoreError::Codec(_))));
        assert_eq!(store.key_ids(), vec!["a"]);
        assert_eq!(store.raw_key_data("a").unwrap(), &before);
        assert_eq!(snapshots.borrow().len(), 1);
    }

    #[test]
    fn invalid_utf8_password_fails_on_read() {
        let (mut store, _) = recording_store();
        store.save_key("alice", PW, &json!("s"), None).unwrap();

        assert!(matches!(
            store.private_key_data("alice", &[0xc3, 0x28]),
            Err(KeyStoreError::Codec(CodecError::InvalidUtf8))
        ));
    }

    #[test]
    fn null_public_data_is_stored_as_none() {
        let (mut store, snapshots) = recording_store();
        store.save_key("alice", PW, &json!("s"), Some(&Value::Null)).unwrap();
        assert_eq!(store.public_key_data("alice").unwrap(), None);

        store.save_public_key_data("alice", Some(json!(1))).unwrap();
        store.save_public_key_data("alice", Some(Value::Null)).unwrap();
        assert_eq!(store.public_key_data("alice").unwrap(), None);
        assert_eq!(snapshots.borrow().last().unwrap()["alice"].public(), None);
    }

    #[test]
    fn failed_flush_is_reported_and_memory_stays_ahead() {
        let mut store = KeyStore::new(
            Context::init().unwrap(),
            failing_save,
            KeysData::new(),
            StoreOptions::new(1000).unwrap(),
        );

        let result = store.save_key("alice", PW, &json!("s"), None);

        assert!(matches!(result, Err(KeyStoreError::Persistence(_))));
        assert_eq!(store.private_key_data("alice", PW).unwrap(), json!("s"));
    }

    #[test]
    fn out_of_range_iterations_are_rejected() {
        assert!(matches!(StoreOptions::new(0), Err(KeyStoreError::InvalidParameters(_))));
        assert!(matches!(
            StoreOptions::new(u32::MAX),
            Err(KeyStoreError::InvalidParameters(_))
        ));
        assert_eq!(StoreOptions::default().iterations(), DEFAULT_ITERATIONS);
    }
}
