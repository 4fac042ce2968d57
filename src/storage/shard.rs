use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::core::error::{Error, Result};
use crate::core::types::{CopyId, CopyRecord, MotherId, MotherRecord, RecordKey};
use crate::storage::layout::{ShardFamily, StorageLayout};

pub type MotherShard = ShardFile<MotherId, MotherRecord>;
pub type CopyShard = ShardFile<CopyId, CopyRecord>;

/// One capacity-bounded shard file held in memory.
///
/// Records are kept in natural ID order, so every `save` writes the shard
/// sorted regardless of the order records were inserted in.
#[derive(Debug, Clone)]
pub struct ShardFile<K, V> {
    pub family: ShardFamily,
    pub index: u32,
    pub path: PathBuf,
    pub records: BTreeMap<K, V>,
}

impl<K, V> ShardFile<K, V>
where
    K: RecordKey + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn empty(layout: &StorageLayout, family: ShardFamily, index: u32) -> Self {
        ShardFile {
            family,
            index,
            path: layout.shard_path(family, index),
            records: BTreeMap::new(),
        }
    }

    /// Load and parse shard `index`.
    ///
    /// A missing file is `NotFound`; a file that is not a valid mapping of
    /// IDs to records is `Corrupt`.
    pub fn load(layout: &StorageLayout, family: ShardFamily, index: u32) -> Result<Self> {
        let path = layout.shard_path(family, index);
        let records = match fs::read_to_string(&path) {
            Ok(text) => parse_records(&path, &text)?,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::not_found(format!("shard file {} does not exist", path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ShardFile {
            family,
            index,
            path,
            records,
        })
    }

    /// Like [`ShardFile::load`], but a missing file yields an empty shard.
    pub fn load_or_empty(layout: &StorageLayout, family: ShardFamily, index: u32) -> Result<Self> {
        match Self::load(layout, family, index) {
            Err(e) if e.is_not_found() => Ok(Self::empty(layout, family, index)),
            other => other,
        }
    }

    /// Write an empty shard file unless one already exists.
    pub fn create_empty(layout: &StorageLayout, family: ShardFamily, index: u32) -> Result<Self> {
        let shard = Self::empty(layout, family, index);
        if !shard.path.exists() {
            shard.save()?;
            tracing::info!(path = %shard.path.display(), "created shard file");
        }
        Ok(shard)
    }

    /// Overwrite the whole shard file.
    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.records)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Slots used so far. For mother shards this is the highest sequence
    /// number present, so holes left by an interrupted bulk load are never
    /// handed out again.
    pub fn occupancy(&self) -> usize {
        let highest = self
            .records
            .last_key_value()
            .and_then(|(key, _)| key.slot())
            .map_or(0, |seq| seq as usize);
        self.records.len().max(highest)
    }

    /// Sequence number the next appended record receives.
    pub fn next_seq(&self) -> u32 {
        (self.occupancy() + 1) as u32
    }

    pub fn remaining(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.occupancy())
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.occupancy() >= capacity
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.records.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.records.insert(key, value)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.records.iter()
    }

    /// Owning mother IDs of the first and last record.
    pub fn bounds(&self) -> Option<(MotherId, MotherId)> {
        let (first, _) = self.records.first_key_value()?;
        let (last, _) = self.records.last_key_value()?;
        Some((first.owner().clone(), last.owner().clone()))
    }
}

fn parse_records<K, V>(path: &Path, text: &str) -> Result<BTreeMap<K, V>>
where
    K: RecordKey + DeserializeOwned,
    V: DeserializeOwned,
{
    if text.trim().is_empty() {
        return Err(Error::corrupt(format!("shard file {} is blank", path.display())));
    }
    serde_json::from_str(text)
        .map_err(|e| Error::corrupt(format!("shard file {} is corrupt: {}", path.display(), e)))
}

/// Serialize `value` as pretty JSON and replace `path` with it.
///
/// The document is written to a uniquely named temp file in the same
/// directory and renamed over the target, so readers never observe a
/// half-written file and concurrent writers never share a temp file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".write-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|e| Error::from(e.error))?;
    Ok(())
}

/// Read a JSON document. A missing or empty file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text)
        .map_err(|e| Error::corrupt(format!("{} is corrupt: {}", path.display(), e)))
}
