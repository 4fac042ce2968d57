use std::fs;
use std::path::{Path, PathBuf};
use regex::Regex;
use crate::core::config::Config;
use crate::core::error::Result;

pub const MOTHER_PREFIX: &str = "book-";
pub const COPY_PREFIX: &str = "book-b-";

/// Which record family a shard file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardFamily {
    Mother,
    Copy,
}

impl ShardFamily {
    pub fn prefix(&self) -> &'static str {
        match self {
            ShardFamily::Mother => MOTHER_PREFIX,
            ShardFamily::Copy => COPY_PREFIX,
        }
    }
}

/// The five derived index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Name,
    Category,
    Status,
    Author,
    Boundary,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Name,
        IndexKind::Category,
        IndexKind::Status,
        IndexKind::Author,
        IndexKind::Boundary,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            IndexKind::Name => "book-name-index.json",
            IndexKind::Category => "book-class-index.json",
            IndexKind::Status => "book-status-index.json",
            IndexKind::Author => "book-zuozhe-index.json",
            IndexKind::Boundary => "book-sw-index.json",
        }
    }
}

/// Directory structure for shard and index files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub mother_dir: PathBuf,    // book-{N}.json
    pub copy_dir: PathBuf,      // book-b-{N}.json
    pub index_dir: PathBuf,     // *-index.json
    mother_pattern: Regex,
    copy_pattern: Regex,
}

impl StorageLayout {
    pub fn new(config: &Config) -> Result<Self> {
        // Create directories
        fs::create_dir_all(&config.mother_dir)?;
        fs::create_dir_all(&config.copy_dir)?;
        fs::create_dir_all(&config.index_dir)?;

        Ok(StorageLayout {
            mother_dir: config.mother_dir.clone(),
            copy_dir: config.copy_dir.clone(),
            index_dir: config.index_dir.clone(),
            mother_pattern: shard_pattern(MOTHER_PREFIX)?,
            copy_pattern: shard_pattern(COPY_PREFIX)?,
        })
    }

    pub fn dir(&self, family: ShardFamily) -> &Path {
        match family {
            ShardFamily::Mother => &self.mother_dir,
            ShardFamily::Copy => &self.copy_dir,
        }
    }

    pub fn shard_file_name(&self, family: ShardFamily, index: u32) -> String {
        format!("{}{}.json", family.prefix(), index)
    }

    pub fn shard_path(&self, family: ShardFamily, index: u32) -> PathBuf {
        self.dir(family).join(self.shard_file_name(family, index))
    }

    /// Embedded shard number of `file_name`, if it names a shard of `family`.
    pub fn parse_shard_index(&self, family: ShardFamily, file_name: &str) -> Option<u32> {
        let pattern = match family {
            ShardFamily::Mother => &self.mother_pattern,
            ShardFamily::Copy => &self.copy_pattern,
        };
        pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .filter(|index| *index > 0)
    }

    /// Every shard number present on disk, ascending.
    pub fn list_shards(&self, family: ShardFamily) -> Result<Vec<u32>> {
        let mut indexes = Vec::new();
        for entry in fs::read_dir(self.dir(family))? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(|n| self.parse_shard_index(family, n)) {
                indexes.push(index);
            }
        }
        indexes.sort_unstable();
        Ok(indexes)
    }

    pub fn latest_shard(&self, family: ShardFamily) -> Result<Option<u32>> {
        Ok(self.list_shards(family)?.last().copied())
    }

    pub fn index_path(&self, kind: IndexKind) -> PathBuf {
        self.index_dir.join(kind.file_name())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.index_dir.join(".lock")
    }
}

fn shard_pattern(prefix: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"^{}(\d+)\.json$", regex::escape(prefix)))?)
}
