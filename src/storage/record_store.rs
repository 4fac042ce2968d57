use std::sync::Arc;
use chrono::{Local, NaiveDateTime, SubsecRound};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{CopyId, CopyRecord, MotherId, MotherRecord, NewBook};
use crate::index::boundary::{BoundaryEntry, BoundaryIndex};
use crate::index::builder::IndexSet;
use crate::storage::allocator::ShardAllocator;
use crate::storage::layout::{IndexKind, ShardFamily, StorageLayout};
use crate::storage::locks::ShardLocks;
use crate::storage::shard::{write_json_atomic, CopyShard, MotherShard};

pub type MotherAllocator = ShardAllocator<MotherId, MotherRecord>;
pub type CopyAllocator = ShardAllocator<CopyId, CopyRecord>;

// Fields that tie records together and must not be edited in place.
const MOTHER_LOCKED_FIELDS: [&str; 1] = ["copies"];
const COPY_LOCKED_FIELDS: [&str; 1] = ["book_id"];

/// Read-modify-write access to individual mother and copy records.
///
/// Mother records are located purely from their ID. Copy records are
/// located through the boundary index, which this store keeps in memory
/// and widens whenever it appends copies.
pub struct RecordStore {
    layout: Arc<StorageLayout>,
    locks: Arc<ShardLocks>,
    mothers: MotherAllocator,
    copies: CopyAllocator,
    boundary: RwLock<BoundaryIndex>,
    family_code: String,
}

impl RecordStore {
    pub fn open(
        layout: Arc<StorageLayout>,
        locks: Arc<ShardLocks>,
        capacity: usize,
        family_code: impl Into<String>,
    ) -> Result<Self> {
        let boundary = BoundaryIndex::read(&layout.index_path(IndexKind::Boundary))?;
        Ok(RecordStore {
            mothers: ShardAllocator::new(layout.clone(), locks.clone(), ShardFamily::Mother, capacity),
            copies: ShardAllocator::new(layout.clone(), locks.clone(), ShardFamily::Copy, capacity),
            layout,
            locks,
            boundary: RwLock::new(boundary),
            family_code: family_code.into(),
        })
    }

    pub fn mothers(&self) -> &MotherAllocator {
        &self.mothers
    }

    pub fn copies(&self) -> &CopyAllocator {
        &self.copies
    }

    /// Create a mother record and `quantity` copies, all with status normal.
    ///
    /// The mother goes into the highest mother shard with room; copies fill
    /// the highest copy shard and spill into new shards as needed.
    pub fn add_record(&self, book: NewBook, quantity: u32) -> Result<MotherId> {
        if quantity == 0 {
            return Err(Error::validation("quantity must be positive"));
        }
        if book.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }

        let created_at = now();
        let family = self.family_code.as_str();

        // The mother cursor stays held until the boundary index is widened,
        // so copy shards receive mothers in ID order.
        let mut mothers = self.mothers.lock();
        let mother_id = mothers.with_open_shard(|shard| {
            let id = MotherId::new(family, shard.index, shard.next_seq());
            if shard.records.contains_key(&id) {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("slot {} in {} is already taken", id, shard.file_name()),
                ));
            }
            let record = book.into_record(created_at, id.copy_ids(quantity));
            shard.insert(id.clone(), record);
            Ok(id)
        })?;

        let entries = self.append_copies(&mother_id, quantity)?;
        self.extend_boundary(&entries)?;
        drop(mothers);

        tracing::debug!(mother_id = %mother_id, quantity, "added record");
        Ok(mother_id)
    }

    // Copies of one mother are written while holding the copy cursor, so
    // they stay contiguous even with concurrent adds.
    fn append_copies(&self, mother_id: &MotherId, quantity: u32) -> Result<Vec<BoundaryEntry>> {
        let capacity = self.copies.capacity();
        let mut cursor = self.copies.lock();
        let mut pending = mother_id.copy_ids(quantity).into_iter().peekable();
        let mut entries = Vec::new();

        while pending.peek().is_some() {
            let file_name = cursor.with_open_shard(|shard| {
                let room = shard.remaining(capacity);
                for copy_id in pending.by_ref().take(room) {
                    shard.insert(copy_id, CopyRecord::new(mother_id.clone()));
                }
                Ok(shard.file_name())
            })?;
            entries.push(BoundaryEntry {
                file_name,
                first: mother_id.clone(),
                last: mother_id.clone(),
            });
        }

        Ok(entries)
    }

    pub fn get_mother(&self, id: &str) -> Result<MotherRecord> {
        let id: MotherId = id.parse()?;
        let shard = MotherShard::load(&self.layout, ShardFamily::Mother, id.shard)?;
        shard
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no mother record {} in {}", id, shard.file_name())))
    }

    /// Set one field of a mother record and overwrite its shard.
    ///
    /// Forward indexes are not touched; changes to title, author or
    /// category show up there after the next rebuild.
    pub fn update_mother_field(&self, id: &str, key: &str, value: Value) -> Result<()> {
        let id: MotherId = id.parse()?;
        let path = self.layout.shard_path(ShardFamily::Mother, id.shard);

        self.locks.with_lock(&path, || {
            let mut shard = MotherShard::load(&self.layout, ShardFamily::Mother, id.shard)?;
            let record = shard
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("no mother record {}", id)))?;
            apply_field(record, key, value, &MOTHER_LOCKED_FIELDS)?;
            shard.save()
        })
    }

    /// Set one field of a copy record, locating its shard through the
    /// boundary index.
    pub fn update_copy_field(&self, id: &str, key: &str, value: Value) -> Result<()> {
        let id: CopyId = id.parse()?;
        let candidates = self.find_relevant_shards(id.mother_id());
        if candidates.is_empty() {
            return Err(Error::not_found(format!("no copy shard covers mother {}", id.mother_id())));
        }

        for file_name in candidates {
            let Some(index) = self.layout.parse_shard_index(ShardFamily::Copy, &file_name) else {
                continue;
            };
            let path = self.layout.shard_path(ShardFamily::Copy, index);
            let updated = self.locks.with_lock(&path, || -> Result<bool> {
                let mut shard = match CopyShard::load(&self.layout, ShardFamily::Copy, index) {
                    Ok(shard) => shard,
                    Err(e) if e.is_not_found() => return Ok(false),
                    Err(e) => return Err(e),
                };
                let Some(record) = shard.get_mut(&id) else {
                    return Ok(false);
                };
                apply_field(record, key, value.clone(), &COPY_LOCKED_FIELDS)?;
                shard.save()?;
                Ok(true)
            })?;
            if updated {
                return Ok(());
            }
        }

        Err(Error::not_found(format!("no copy record {}", id)))
    }

    /// All copies of `mother_id`, in copy-number order.
    pub fn get_all_copies(&self, mother_id: &str) -> Result<Vec<(CopyId, CopyRecord)>> {
        let mother_id: MotherId = mother_id.parse()?;
        let mut found = Vec::new();

        for file_name in self.find_relevant_shards(&mother_id) {
            let Some(index) = self.layout.parse_shard_index(ShardFamily::Copy, &file_name) else {
                continue;
            };
            let shard = match CopyShard::load(&self.layout, ShardFamily::Copy, index) {
                Ok(shard) => shard,
                Err(e) if e.is_not_found() || e.is_corrupt() => {
                    tracing::warn!(file = %file_name, error = %e, "copy shard unreadable");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for (copy_id, record) in shard.iter() {
                let owner = copy_id.mother_id();
                if owner == &mother_id {
                    found.push((copy_id.clone(), record.clone()));
                } else if owner > &mother_id {
                    break;
                }
            }
        }

        Ok(found)
    }

    pub fn find_relevant_shards(&self, mother_id: &MotherId) -> Vec<String> {
        self.boundary.read().find_relevant_shards(mother_id)
    }

    pub fn boundary(&self) -> BoundaryIndex {
        self.boundary.read().clone()
    }

    /// Run a full index rebuild with the boundary index locked for writing,
    /// then swap in the boundary it produced.
    ///
    /// Adds that finish during the rebuild wait for it, so their copies are
    /// either in the scanned shards or extend the new boundary afterwards.
    pub fn rebuild_boundary<S>(&self, build: impl FnOnce() -> Result<(IndexSet, S)>) -> Result<S> {
        let mut boundary = self.boundary.write();
        let (set, stats) = build()?;
        *boundary = set.boundary;
        Ok(stats)
    }

    /// Widen boundary ranges for newly written copies and persist the
    /// boundary index file.
    pub fn extend_boundary(&self, entries: &[BoundaryEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut boundary = self.boundary.write();
        for entry in entries {
            boundary.extend(entry);
        }
        write_json_atomic(&self.layout.index_path(IndexKind::Boundary), &*boundary)
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Replace `key` in the JSON form of `record`, then parse it back so a value
/// of the wrong shape is rejected.
fn apply_field<T>(record: &mut T, key: &str, value: Value, locked: &[&str]) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    if locked.contains(&key) {
        return Err(Error::invalid_argument(format!("field {:?} cannot be edited", key)));
    }

    let mut json = serde_json::to_value(&*record)?;
    let fields = json
        .as_object_mut()
        .ok_or_else(|| Error::new(ErrorKind::Internal, "record is not a JSON object".to_string()))?;
    if !fields.contains_key(key) {
        return Err(Error::invalid_argument(format!("unknown field {:?}", key)));
    }
    fields.insert(key.to_string(), value);

    *record = serde_json::from_value(json)
        .map_err(|e| Error::validation(format!("invalid value for {:?}: {}", key, e)))?;
    Ok(())
}
