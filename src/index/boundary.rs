use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::MotherId;
use crate::core::utils::natural_cmp;
use crate::storage::shard::read_json_or_default;

/// `[first, last]` owning mother IDs of one copy shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRange(pub MotherId, pub MotherId);

impl ShardRange {
    pub fn start(&self) -> &MotherId {
        &self.0
    }

    pub fn end(&self) -> &MotherId {
        &self.1
    }

    pub fn contains(&self, id: &MotherId) -> bool {
        &self.0 <= id && id <= &self.1
    }
}

/// Range observed while writing one copy shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryEntry {
    pub file_name: String,
    pub first: MotherId,
    pub last: MotherId,
}

/// Copy-shard file name → owning mother-ID range.
///
/// Only meaningful while every copy shard holds an ascending run of mother
/// IDs that does not overlap its neighbours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryIndex {
    pub ranges: BTreeMap<String, ShardRange>,
}

impl BoundaryIndex {
    pub fn new() -> Self {
        BoundaryIndex::default()
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_json_or_default(path)
    }

    pub fn insert(&mut self, file_name: impl Into<String>, first: MotherId, last: MotherId) {
        self.ranges.insert(file_name.into(), ShardRange(first, last));
    }

    /// Widen the range of `entry.file_name` to cover `entry`.
    pub fn extend(&mut self, entry: &BoundaryEntry) {
        self.ranges
            .entry(entry.file_name.clone())
            .and_modify(|range| {
                if entry.first < range.0 {
                    range.0 = entry.first.clone();
                }
                if entry.last > range.1 {
                    range.1 = entry.last.clone();
                }
            })
            .or_insert_with(|| ShardRange(entry.first.clone(), entry.last.clone()));
    }

    pub fn get(&self, file_name: &str) -> Option<&ShardRange> {
        self.ranges.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Entries ordered by the shard number embedded in the file name.
    pub fn ordered(&self) -> Vec<(&str, &ShardRange)> {
        let mut entries: Vec<(&str, &ShardRange)> = self
            .ranges
            .iter()
            .map(|(name, range)| (name.as_str(), range))
            .collect();
        entries.sort_by(|a, b| natural_cmp(a.0, b.0));
        entries
    }

    /// Copy shards that can hold copies of `mother_id`, in shard order.
    ///
    /// Normally one file; two or more when the mother's copies straddle a
    /// shard boundary.
    pub fn find_relevant_shards(&self, mother_id: &MotherId) -> Vec<String> {
        let mut relevant = Vec::new();
        let mut started = false;

        for (file_name, range) in self.ordered() {
            if !started {
                if range.start() <= mother_id {
                    started = true;
                } else {
                    continue;
                }
            }

            if range.contains(mother_id) {
                relevant.push(file_name.to_string());
            } else if mother_id < range.start() {
                // Ranges ascend, nothing further can match
                break;
            }
        }

        relevant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> MotherId {
        s.parse().unwrap()
    }

    fn sample() -> BoundaryIndex {
        let mut index = BoundaryIndex::new();
        index.insert("book-b-1.json", id("1-1-001"), id("1-1-300"));
        index.insert("book-b-2.json", id("1-1-300"), id("1-1-650"));
        index.insert("book-b-10.json", id("1-3-100"), id("1-3-400"));
        index.insert("book-b-3.json", id("1-1-651"), id("1-2-999"));
        index
    }

    #[test]
    fn ordered_uses_numeric_shard_order() {
        let index = sample();
        let names: Vec<&str> = index.ordered().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["book-b-1.json", "book-b-2.json", "book-b-3.json", "book-b-10.json"]);
    }

    #[test]
    fn straddling_mother_hits_both_shards() {
        let index = sample();
        assert_eq!(
            index.find_relevant_shards(&id("1-1-300")),
            vec!["book-b-1.json".to_string(), "book-b-2.json".to_string()]
        );
    }

    #[test]
    fn lookup_compares_ids_naturally() {
        let index = sample();
        // "1-2-010" sorts before "1-1-651" as a string
        assert_eq!(index.find_relevant_shards(&id("1-2-010")), vec!["book-b-3.json".to_string()]);
        assert_eq!(index.find_relevant_shards(&id("1-3-200")), vec!["book-b-10.json".to_string()]);
    }

    #[test]
    fn ids_outside_every_range_find_nothing() {
        let index = sample();
        assert!(index.find_relevant_shards(&id("1-3-050")).is_empty());
        assert!(index.find_relevant_shards(&id("1-4-001")).is_empty());
        assert!(BoundaryIndex::new().find_relevant_shards(&id("1-1-001")).is_empty());
    }

    #[test]
    fn extend_widens_existing_range() {
        let mut index = sample();
        index.extend(&BoundaryEntry {
            file_name: "book-b-10.json".to_string(),
            first: id("1-3-100"),
            last: id("1-3-450"),
        });
        assert_eq!(index.get("book-b-10.json"), Some(&ShardRange(id("1-3-100"), id("1-3-450"))));
    }

    #[test]
    fn serializes_as_two_element_arrays() {
        let mut index = BoundaryIndex::new();
        index.insert("book-b-1.json", id("1-1-001"), id("1-1-002"));
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"book-b-1.json":["1-1-001","1-1-002"]}"#);
    }
}
