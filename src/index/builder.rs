use std::sync::Arc;
use std::time::Instant;
use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::core::error::Result;
use crate::core::types::{CopyId, MotherId, RecordKey};
use crate::index::boundary::BoundaryIndex;
use crate::index::forward::ForwardIndex;
use crate::storage::layout::{IndexKind, ShardFamily, StorageLayout};
use crate::storage::shard::{write_json_atomic, CopyShard, MotherShard, ShardFile};

/// The four forward indexes plus the boundary index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSet {
    pub name: ForwardIndex<MotherId>,      // first title character
    pub author: ForwardIndex<MotherId>,
    pub category: ForwardIndex<MotherId>,
    pub status: ForwardIndex<CopyId>,
    pub boundary: BoundaryIndex,
}

impl IndexSet {
    /// Read all five index files. Missing files read as empty indexes.
    pub fn load(layout: &StorageLayout) -> Result<Self> {
        Ok(IndexSet {
            name: ForwardIndex::read(&layout.index_path(IndexKind::Name))?,
            author: ForwardIndex::read(&layout.index_path(IndexKind::Author))?,
            category: ForwardIndex::read(&layout.index_path(IndexKind::Category))?,
            status: ForwardIndex::read(&layout.index_path(IndexKind::Status))?,
            boundary: BoundaryIndex::read(&layout.index_path(IndexKind::Boundary))?,
        })
    }

    /// Replace all five index files.
    pub fn write(&self, layout: &StorageLayout) -> Result<()> {
        write_json_atomic(&layout.index_path(IndexKind::Name), &self.name)?;
        write_json_atomic(&layout.index_path(IndexKind::Status), &self.status)?;
        write_json_atomic(&layout.index_path(IndexKind::Author), &self.author)?;
        write_json_atomic(&layout.index_path(IndexKind::Category), &self.category)?;
        write_json_atomic(&layout.index_path(IndexKind::Boundary), &self.boundary)?;
        Ok(())
    }

    /// Every mother ID reachable through a forward index, sorted.
    pub fn all_mother_ids(&self) -> Vec<MotherId> {
        let mut ids: Vec<MotherId> = self
            .name
            .ids()
            .chain(self.author.ids())
            .chain(self.category.ids())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub mother_shards: usize,
    pub copy_shards: usize,
    pub mothers: usize,
    pub copies: usize,
    pub skipped_shards: Vec<String>,
    pub elapsed_ms: u128,
}

/// Re-derives every index from shard contents.
pub struct IndexBuilder {
    layout: Arc<StorageLayout>,
}

impl IndexBuilder {
    pub fn new(layout: Arc<StorageLayout>) -> Self {
        IndexBuilder { layout }
    }

    /// Scan every shard and build the indexes in memory.
    pub fn build(&self) -> Result<(IndexSet, RebuildStats)> {
        let start = Instant::now();
        let mut set = IndexSet::default();
        let mut stats = RebuildStats::default();

        let mothers: Vec<MotherShard> = self.load_family(ShardFamily::Mother, &mut stats.skipped_shards)?;
        for shard in &mothers {
            for (id, record) in shard.iter() {
                if let Some(first) = record.title.chars().next() {
                    set.name.add(first.encode_utf8(&mut [0u8; 4]), id.clone());
                }
                set.author.add(&record.author, id.clone());
                set.category.add(&record.category, id.clone());
                stats.mothers += 1;
            }
        }
        stats.mother_shards = mothers.len();

        let copies: Vec<CopyShard> = self.load_family(ShardFamily::Copy, &mut stats.skipped_shards)?;
        for shard in &copies {
            for (id, record) in shard.iter() {
                set.status.add(record.status.as_str(), id.clone());
                stats.copies += 1;
            }
            if let Some((first, last)) = shard.bounds() {
                set.boundary.insert(shard.file_name(), first, last);
            }
        }
        stats.copy_shards = copies.len();

        stats.elapsed_ms = start.elapsed().as_millis();
        Ok((set, stats))
    }

    /// Build the indexes and overwrite the five index files.
    pub fn rebuild(&self) -> Result<(IndexSet, RebuildStats)> {
        let (set, stats) = self.build()?;
        set.write(&self.layout)?;
        tracing::info!(
            mothers = stats.mothers,
            copies = stats.copies,
            mother_shards = stats.mother_shards,
            copy_shards = stats.copy_shards,
            skipped = stats.skipped_shards.len(),
            elapsed_ms = stats.elapsed_ms as u64,
            "rebuilt indexes"
        );
        Ok((set, stats))
    }

    // Shards are parsed in parallel but returned in ascending shard order.
    // Corrupt shards are logged and left out.
    fn load_family<K, V>(&self, family: ShardFamily, skipped: &mut Vec<String>) -> Result<Vec<ShardFile<K, V>>>
    where
        K: RecordKey + Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned + Send,
    {
        let layout = self.layout.as_ref();
        let loaded: Vec<(u32, Result<ShardFile<K, V>>)> = layout
            .list_shards(family)?
            .into_par_iter()
            .map(|index| (index, ShardFile::load(layout, family, index)))
            .collect();

        let mut shards = Vec::with_capacity(loaded.len());
        for (index, result) in loaded {
            match result {
                Ok(shard) => shards.push(shard),
                Err(e) if e.is_corrupt() || e.is_not_found() => {
                    let file_name = layout.shard_file_name(family, index);
                    tracing::warn!(file = %file_name, error = %e, "skipping shard during index rebuild");
                    skipped.push(file_name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(shards)
    }
}
