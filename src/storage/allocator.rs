use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::core::error::Result;
use crate::core::types::RecordKey;
use crate::storage::layout::{ShardFamily, StorageLayout};
use crate::storage::locks::ShardLocks;
use crate::storage::shard::ShardFile;

/// Highest shard of a family and how many of its slots are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCursor {
    pub index: u32,
    pub occupancy: usize,
}

/// Where the next record(s) of a family go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSlot {
    pub index: u32,
    pub path: PathBuf,
    pub occupancy: usize,
    pub remaining: usize,
}

impl ShardSlot {
    /// Sequence number the next record in this shard receives.
    pub fn next_seq(&self) -> u32 {
        (self.occupancy + 1) as u32
    }

    /// 1-based position of the next record across all shards.
    pub fn next_ordinal(&self, capacity: usize) -> usize {
        (self.index as usize - 1) * capacity + self.occupancy + 1
    }
}

/// Hands out room in the highest shard of one record family.
///
/// The directory is scanned once to find the highest shard; after that the
/// cursor is kept in memory. The cursor lock is held for the whole
/// pick-load-modify-save sequence, so two writers can never be handed the
/// same slot.
pub struct ShardAllocator<K, V> {
    layout: Arc<StorageLayout>,
    locks: Arc<ShardLocks>,
    family: ShardFamily,
    capacity: usize,
    cursor: Mutex<Option<ShardCursor>>,
    _records: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ShardAllocator<K, V>
where
    K: RecordKey + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn new(
        layout: Arc<StorageLayout>,
        locks: Arc<ShardLocks>,
        family: ShardFamily,
        capacity: usize,
    ) -> Self {
        ShardAllocator {
            layout,
            locks,
            family,
            capacity,
            cursor: Mutex::new(None),
            _records: PhantomData,
        }
    }

    pub fn family(&self) -> ShardFamily {
        self.family
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hold the cursor for a sequence of allocations.
    pub fn lock(&self) -> AllocatorGuard<'_, K, V> {
        AllocatorGuard {
            allocator: self,
            cursor: self.cursor.lock(),
        }
    }

    /// Find the shard the next record goes to, creating it if needed.
    pub fn allocate(&self) -> Result<ShardSlot> {
        self.lock().allocate()
    }

    /// Load the current writable shard, let `f` add records to it and
    /// write it back.
    pub fn with_open_shard<R>(&self, f: impl FnOnce(&mut ShardFile<K, V>) -> Result<R>) -> Result<R> {
        self.lock().with_open_shard(f)
    }

    pub fn cursor(&self) -> Option<ShardCursor> {
        *self.cursor.lock()
    }

    /// Forget the cursor; the next allocation rescans the directory.
    pub fn reset(&self) {
        *self.cursor.lock() = None;
    }

    fn discover(&self) -> Result<u32> {
        Ok(self.layout.latest_shard(self.family)?.unwrap_or(1))
    }
}

pub struct AllocatorGuard<'a, K, V> {
    allocator: &'a ShardAllocator<K, V>,
    cursor: MutexGuard<'a, Option<ShardCursor>>,
}

impl<'a, K, V> AllocatorGuard<'a, K, V>
where
    K: RecordKey + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn allocate(&mut self) -> Result<ShardSlot> {
        let capacity = self.allocator.capacity;
        self.visit(false, |shard| {
            Ok(ShardSlot {
                index: shard.index,
                path: shard.path.clone(),
                occupancy: shard.occupancy(),
                remaining: shard.remaining(capacity),
            })
        })
    }

    pub fn with_open_shard<R>(&mut self, f: impl FnOnce(&mut ShardFile<K, V>) -> Result<R>) -> Result<R> {
        self.visit(true, f)
    }

    pub fn reset(&mut self) {
        *self.cursor = None;
    }

    // Walks forward from the cursor until a shard with room is found.
    // Full shards are passed over, corrupt ones are skipped for good and a
    // missing one is created empty.
    fn visit<R>(&mut self, write: bool, f: impl FnOnce(&mut ShardFile<K, V>) -> Result<R>) -> Result<R> {
        let allocator = self.allocator;
        let layout = allocator.layout.as_ref();
        let family = allocator.family;

        let mut index = match self.cursor.as_ref() {
            Some(cursor) => cursor.index,
            None => allocator.discover()?,
        };

        loop {
            let path = layout.shard_path(family, index);
            let lock = allocator.locks.lock_for(&path);
            let guard = lock.lock();

            match ShardFile::<K, V>::load(layout, family, index) {
                Ok(mut shard) if !shard.is_full(allocator.capacity) => {
                    let out = f(&mut shard)?;
                    if write {
                        shard.save()?;
                    }
                    *self.cursor = Some(ShardCursor {
                        index,
                        occupancy: shard.occupancy(),
                    });
                    return Ok(out);
                }
                Ok(_) => index += 1,
                Err(e) if e.is_corrupt() => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt shard");
                    index += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            drop(guard);
            ShardFile::<K, V>::create_empty(layout, family, index)?;
        }
    }
}
