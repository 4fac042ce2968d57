use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::core::error::{Error, Result};

pub const DEFAULT_SHARD_CAPACITY: usize = 999;
pub const DEFAULT_FAMILY_CODE: &str = "1";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mother_dir: PathBuf,                 // book-{N}.json
    pub copy_dir: PathBuf,                   // book-b-{N}.json
    pub index_dir: PathBuf,                  // the five index files

    pub shard_capacity: usize,               // Max records per shard file
    pub family_code: String,                 // Leading segment of every mother ID

    pub loader_workers: usize,               // Bulk loader pool size
    pub loader_worker_timeout_secs: u64,     // Upper bound on a bulk load's generation phase
}

impl Default for Config {
    fn default() -> Self {
        Config::new("./db")
    }
}

impl Config {
    /// Standard arrangement under one base directory:
    /// `db/data`, `db/data-b` and `index`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Config {
            mother_dir: base_dir.join("db").join("data"),
            copy_dir: base_dir.join("db").join("data-b"),
            index_dir: base_dir.join("index"),
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            family_code: DEFAULT_FAMILY_CODE.to_string(),
            loader_workers: num_cpus::get().max(1),
            loader_worker_timeout_secs: 600,
        }
    }

    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity;
        self
    }

    pub fn with_loader_workers(mut self, workers: usize) -> Self {
        self.loader_workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_capacity == 0 || self.shard_capacity > 999 {
            return Err(Error::invalid_argument(format!(
                "shard_capacity must be within 1..=999, got {}",
                self.shard_capacity
            )));
        }
        if self.family_code.is_empty() || self.family_code.contains('-') {
            return Err(Error::invalid_argument(format!(
                "family_code must be a non-empty string without '-', got {:?}",
                self.family_code
            )));
        }
        if self.loader_workers == 0 {
            return Err(Error::invalid_argument("loader_workers must be at least 1"));
        }
        Ok(())
    }
}
