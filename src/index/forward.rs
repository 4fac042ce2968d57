use std::collections::BTreeMap;
use std::path::Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::storage::shard::read_json_or_default;

/// Scalar key → owning IDs, e.g. author → mother IDs.
///
/// Keys are kept sorted so the serialized file is deterministic; each ID
/// list keeps the order the builder encountered the records in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwardIndex<Id> {
    pub entries: BTreeMap<String, Vec<Id>>,
}

impl<Id> Default for ForwardIndex<Id> {
    fn default() -> Self {
        ForwardIndex {
            entries: BTreeMap::new(),
        }
    }
}

impl<Id: Clone> ForwardIndex<Id> {
    pub fn new() -> Self {
        ForwardIndex::default()
    }

    /// Empty keys are not indexed.
    pub fn add(&mut self, key: &str, id: Id) {
        if key.is_empty() {
            return;
        }
        self.entries.entry(key.to_string()).or_default().push(id);
    }

    pub fn get(&self, key: &str) -> &[Id] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &Id> {
        self.entries.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<Id: DeserializeOwned> ForwardIndex<Id> {
    /// Read an index file. Missing or empty files give an empty index.
    pub fn read(path: &Path) -> Result<Self> {
        read_json_or_default(path)
    }
}
