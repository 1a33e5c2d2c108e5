use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::base64;
use crate::crypto::Nonce;

/// All records of a store, keyed by key ID.
pub type KeysData = BTreeMap<String, KeyRecord>;

/// Parameters needed to re-derive a record's key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub nonce: Nonce,
    pub iterations: u32,
}

/// A stored key: derivation metadata, optional public data and the
/// encrypted private data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyRecord {
    metadata: Metadata,
    #[serde(default)]
    public: Option<Value>,
    #[serde(with = "base64::as_string")]
    private: Vec<u8>,
}

impl KeyRecord {
    pub(crate) fn new(metadata: Metadata, public: Option<Value>, private: Vec<u8>) -> Self {
        Self {
            metadata,
            public: present(public),
            private,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn public(&self) -> Option<&Value> {
        self.public.as_ref()
    }

    /// Ciphertext of the private data, tag included.
    pub fn private(&self) -> &[u8] {
        &self.private
    }

    pub(crate) fn set_public(&mut self, public: Option<Value>) {
        self.public = present(public);
    }
}

/// A JSON `null` reads back as a missing field, so it is kept as `None`.
fn present(public: Option<Value>) -> Option<Value> {
    public.filter(|value| !value.is_null())
}
