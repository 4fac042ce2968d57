use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::CatalogStats;
use crate::core::types::{parse_quantity, CopyId, CopyRecord, MotherId, MotherRecord, NewBook};
use crate::index::builder::{IndexBuilder, IndexSet, RebuildStats};
use crate::index::query::IndexQuery;
use crate::parallel::bulk_loader::{BulkLoader, LoadReport, LoaderConfig, RecordSource};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::locks::ShardLocks;
use crate::storage::record_store::RecordStore;

pub struct Catalog {
    config: Config,

    layout: Arc<StorageLayout>,

    store: RecordStore,           // single-record reads and writes
    builder: IndexBuilder,        // full index rebuild
    loader: BulkLoader,           // parallel ingestion

    _lock: FileLock,              // held for the catalog's lifetime
}

impl Catalog {
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let layout = Arc::new(StorageLayout::new(&config)?);
        let lock = FileLock::acquire(&layout)?;
        let locks = Arc::new(ShardLocks::new());

        let store = RecordStore::open(
            layout.clone(),
            locks.clone(),
            config.shard_capacity,
            config.family_code.clone(),
        )?;
        let builder = IndexBuilder::new(layout.clone());
        let loader = BulkLoader::new(
            layout.clone(),
            locks,
            LoaderConfig {
                workers: config.loader_workers,
                worker_timeout: Duration::from_secs(config.loader_worker_timeout_secs),
                capacity: config.shard_capacity,
                family_code: config.family_code.clone(),
            },
        );

        Ok(Catalog {
            config,
            layout,
            store,
            builder,
            loader,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn add_record(&self, book: NewBook, quantity: u32) -> Result<MotherId> {
        self.store.add_record(book, quantity)
    }

    /// Same as [`Catalog::add_record`] with the quantity still in text form.
    pub fn add_record_text(&self, book: NewBook, quantity: &str) -> Result<MotherId> {
        self.add_record(book, parse_quantity(quantity)?)
    }

    pub fn get_record(&self, mother_id: &str) -> Result<MotherRecord> {
        self.store.get_mother(mother_id)
    }

    pub fn get_copies(&self, mother_id: &str) -> Result<Vec<(CopyId, CopyRecord)>> {
        self.store.get_all_copies(mother_id)
    }

    pub fn update_mother_field(&self, mother_id: &str, key: &str, value: Value) -> Result<()> {
        self.store.update_mother_field(mother_id, key, value)
    }

    pub fn update_copy_field(&self, copy_id: &str, key: &str, value: Value) -> Result<()> {
        self.store.update_copy_field(copy_id, key, value)
    }

    /// Rebuild all five indexes from the shard files.
    ///
    /// Runs under the in-memory boundary lock, so a concurrent add cannot
    /// widen the boundary file between the scan and the swap.
    pub fn rebuild_indexes(&self) -> Result<RebuildStats> {
        self.store.rebuild_boundary(|| self.builder.rebuild())
    }

    /// Current on-disk index files.
    pub fn read_indexes(&self) -> Result<IndexSet> {
        IndexSet::load(&self.layout)
    }

    pub fn find_relevant_shards(&self, mother_id: &str) -> Result<Vec<String>> {
        let mother_id: MotherId = mother_id.parse()?;
        Ok(self.store.find_relevant_shards(&mother_id))
    }

    pub fn allocate_mother_slot(&self) -> Result<(PathBuf, MotherId)> {
        let slot = self.store.mothers().allocate()?;
        let id = MotherId::new(self.config.family_code.as_str(), slot.index, slot.next_seq());
        Ok((slot.path, id))
    }

    pub fn allocate_copy_capacity(&self) -> Result<(PathBuf, usize)> {
        let slot = self.store.copies().allocate()?;
        Ok((slot.path, slot.remaining))
    }

    /// Generate `total` records through `source` and append them to the
    /// catalog. Forward indexes are stale until the next rebuild.
    pub fn bulk_load(&self, total: usize, source: Arc<dyn RecordSource>) -> Result<LoadReport> {
        if total == 0 {
            return Err(Error::validation("bulk load needs at least one record"));
        }
        let report = self.loader.load(total, source, self.store.mothers(), self.store.copies())?;
        self.store.extend_boundary(&report.copy_shards)?;
        Ok(report)
    }

    pub fn bulk_progress(&self) -> usize {
        self.loader.progress()
    }

    pub fn cancel_bulk_load(&self) {
        self.loader.cancel();
    }

    /// Run `query` against the on-disk indexes and load the matching
    /// records. IDs that no longer resolve are skipped.
    pub fn search(&self, query: &IndexQuery) -> Result<Vec<(MotherId, MotherRecord)>> {
        let indexes = self.read_indexes()?;
        let mut results = Vec::new();
        for id in query.execute(&indexes) {
            match self.store.get_mother(&id.to_string()) {
                Ok(record) => results.push((id, record)),
                Err(e) if e.is_not_found() || e.is_corrupt() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        CatalogStats::collect(&self.layout, self.config.shard_capacity)
    }
}
