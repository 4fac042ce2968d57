use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::{CopyId, CopyRecord, MotherId, MotherRecord};
use crate::storage::layout::{ShardFamily, StorageLayout};
use crate::storage::shard::ShardFile;

/// Catalog statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub mother: FamilyStats,
    pub copy: FamilyStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyStats {
    pub shard_count: usize,
    pub record_count: usize,
    pub full_shards: usize,
    pub corrupt_shards: Vec<String>,
}

impl CatalogStats {
    pub fn collect(layout: &StorageLayout, capacity: usize) -> Result<Self> {
        Ok(CatalogStats {
            mother: family_stats::<MotherId, MotherRecord>(layout, ShardFamily::Mother, capacity)?,
            copy: family_stats::<CopyId, CopyRecord>(layout, ShardFamily::Copy, capacity)?,
        })
    }
}

fn family_stats<K, V>(layout: &StorageLayout, family: ShardFamily, capacity: usize) -> Result<FamilyStats>
where
    K: crate::core::types::RecordKey + Serialize + serde::de::DeserializeOwned,
    V: Serialize + serde::de::DeserializeOwned,
{
    let mut stats = FamilyStats::default();
    for index in layout.list_shards(family)? {
        stats.shard_count += 1;
        match ShardFile::<K, V>::load(layout, family, index) {
            Ok(shard) => {
                stats.record_count += shard.len();
                if shard.is_full(capacity) {
                    stats.full_shards += 1;
                }
            }
            Err(e) if e.is_corrupt() => stats.corrupt_shards.push(layout.shard_file_name(family, index)),
            Err(e) if e.is_not_found() => stats.shard_count -= 1,
            Err(e) => return Err(e),
        }
    }
    Ok(stats)
}
