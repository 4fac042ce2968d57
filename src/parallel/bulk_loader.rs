use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use crossbeam::channel::{unbounded, RecvTimeoutError};
use parking_lot::Mutex;
use rayon::prelude::*;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{CopyId, CopyRecord, MotherId, MotherRecord};
use crate::index::boundary::BoundaryEntry;
use crate::storage::allocator::AllocatorGuard;
use crate::storage::layout::{ShardFamily, StorageLayout};
use crate::storage::locks::ShardLocks;
use crate::storage::record_store::{CopyAllocator, MotherAllocator};
use crate::storage::shard::MotherShard;

/// Supplies record content for the bulk loader.
///
/// Called concurrently from every worker. The loader owns identity: the
/// returned record's `copies` list and each copy's `mother_id` are
/// overwritten to match `mother_id`, and copy `k` (1-based, in returned
/// order) becomes `{mother_id}-{k}`.
pub trait RecordSource: Send + Sync {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook>;
}

#[derive(Debug, Clone)]
pub struct GeneratedBook {
    pub record: MotherRecord,
    pub copies: Vec<CopyRecord>,
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub workers: usize,
    pub worker_timeout: Duration,
    pub capacity: usize,
    pub family_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub mothers: usize,
    pub copies: usize,
    pub mother_shards: Vec<u32>,          // mother shards merged into
    pub copy_shards: Vec<BoundaryEntry>,  // copy shards written, with their new ranges
    pub elapsed: Duration,
}

type CopyBatch = Vec<(CopyId, CopyRecord)>;

struct WorkerOutput {
    copies: CopyBatch,
    mother_shards: Vec<u32>,
}

// Everything a worker thread needs, shared by all workers.
struct WorkerContext {
    layout: Arc<StorageLayout>,
    locks: Arc<ShardLocks>,
    write_lock: Arc<Mutex<()>>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<AtomicUsize>,
    source: Arc<dyn RecordSource>,
    family_code: String,
    capacity: usize,
}

/// Populates mother and copy shards at scale.
///
/// Phase 1 generates records on a fixed pool of worker threads, each
/// owning a contiguous ordinal range. Phase 2 has every worker merge its
/// buffered mothers into their shard files under one global write lock.
/// Phase 3 runs on the calling thread once all workers are done: every
/// buffered copy is sorted in natural ID order and written sequentially,
/// so each copy shard ends up an ascending, non-overlapping run of mother
/// IDs.
pub struct BulkLoader {
    layout: Arc<StorageLayout>,
    locks: Arc<ShardLocks>,
    config: LoaderConfig,
    write_lock: Arc<Mutex<()>>,
    cancelled: Arc<Mutex<Arc<AtomicBool>>>,
    progress: Arc<AtomicUsize>,
}

impl BulkLoader {
    pub fn new(layout: Arc<StorageLayout>, locks: Arc<ShardLocks>, config: LoaderConfig) -> Self {
        BulkLoader {
            layout,
            locks,
            config,
            write_lock: Arc::new(Mutex::new(())),
            cancelled: Arc::new(Mutex::new(Arc::new(AtomicBool::new(false)))),
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mother records generated by the running (or last) load.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }

    /// Ask the running load's workers to stop.
    pub fn cancel(&self) {
        self.cancelled.lock().store(true, Ordering::SeqCst);
    }

    /// Generate and persist `total` mother records after the existing ones.
    ///
    /// Both allocators are held for the duration, so no single-record add
    /// can interleave. Their cursors are reset afterwards. Returns only once
    /// every worker thread has stopped, whether the load succeeded or not.
    pub fn load(
        &self,
        total: usize,
        source: Arc<dyn RecordSource>,
        mothers: &MotherAllocator,
        copies: &CopyAllocator,
    ) -> Result<LoadReport> {
        let start = Instant::now();
        let mut mother_cursor = mothers.lock();
        let mut copy_cursor = copies.lock();

        let first_ordinal = mother_cursor.allocate()?.next_ordinal(self.config.capacity);
        let result = self.generate_and_merge(first_ordinal, total, source);
        mother_cursor.reset();
        let outputs = result?;

        let mut report = LoadReport {
            mothers: total,
            ..Default::default()
        };
        let mut all_copies = Vec::with_capacity(outputs.iter().map(|o| o.copies.len()).sum());
        for output in outputs {
            report.mother_shards.extend(output.mother_shards);
            all_copies.extend(output.copies);
        }
        report.mother_shards.sort_unstable();
        report.mother_shards.dedup();
        report.copies = all_copies.len();

        report.copy_shards = write_sorted_copies(all_copies, &mut copy_cursor, self.config.capacity)?;
        copy_cursor.reset();

        report.elapsed = start.elapsed();
        tracing::info!(
            mothers = report.mothers,
            copies = report.copies,
            mother_shards = report.mother_shards.len(),
            copy_shards = report.copy_shards.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "bulk load finished"
        );
        Ok(report)
    }

    /// Split `total` ordinals starting at `first` into one contiguous range
    /// per worker. The last worker takes the remainder.
    pub fn partition(first: usize, total: usize, workers: usize) -> Vec<Range<usize>> {
        let workers = workers.max(1);
        let chunk = total / workers;
        (0..workers)
            .map(|i| {
                let start = first + i * chunk;
                let end = if i + 1 == workers { first + total } else { start + chunk };
                start..end
            })
            .filter(|range| !range.is_empty())
            .collect()
    }

    // Phases 1 and 2. Returns per-worker output in worker order.
    fn generate_and_merge(
        &self,
        first_ordinal: usize,
        total: usize,
        source: Arc<dyn RecordSource>,
    ) -> Result<Vec<WorkerOutput>> {
        let cancelled = Arc::new(AtomicBool::new(false));
        *self.cancelled.lock() = cancelled.clone();
        self.progress.store(0, Ordering::Relaxed);

        let context = Arc::new(WorkerContext {
            layout: self.layout.clone(),
            locks: self.locks.clone(),
            write_lock: self.write_lock.clone(),
            cancelled: cancelled.clone(),
            progress: self.progress.clone(),
            source,
            family_code: self.config.family_code.clone(),
            capacity: self.config.capacity,
        });

        let ranges = Self::partition(first_ordinal, total, self.config.workers);
        let (sender, receiver) = unbounded();

        for (worker, range) in ranges.iter().cloned().enumerate() {
            let sender = sender.clone();
            let context = context.clone();
            thread::Builder::new()
                .name(format!("bulk-loader-{}", worker))
                .spawn(move || {
                    let result = run_worker(&context, range);
                    if result.is_err() {
                        context.cancelled.store(true, Ordering::SeqCst);
                    }
                    let _ = sender.send((worker, result));
                })?;
        }
        drop(sender);

        // Barrier: wait for every worker, bounded by the configured timeout.
        // After the first failure the remaining workers are cancelled and
        // drained, so no worker outlives the load.
        let deadline = Instant::now() + self.config.worker_timeout;
        let mut outputs: Vec<Option<WorkerOutput>> = ranges.iter().map(|_| None).collect();
        let mut failure: Option<Error> = None;
        let mut pending = ranges.len();

        while pending > 0 {
            let received = if failure.is_none() {
                receiver.recv_deadline(deadline)
            } else {
                receiver.recv().map_err(|_| RecvTimeoutError::Disconnected)
            };

            match received {
                Ok((worker, Ok(output))) => {
                    pending -= 1;
                    outputs[worker] = Some(output);
                }
                Ok((worker, Err(e))) => {
                    pending -= 1;
                    cancelled.store(true, Ordering::SeqCst);
                    tracing::warn!(worker, error = %e, "bulk load worker failed");
                    // Workers stopped by the flag report Cancelled; keep the cause
                    match &failure {
                        Some(first) if first.kind != ErrorKind::Cancelled => {}
                        Some(_) if e.kind == ErrorKind::Cancelled => {}
                        _ => failure = Some(e),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::SeqCst);
                    tracing::warn!(pending, "bulk load timed out, waiting for workers to stop");
                    failure = Some(Error::new(
                        ErrorKind::Timeout,
                        format!("bulk load workers did not finish within {:?}", self.config.worker_timeout),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    cancelled.store(true, Ordering::SeqCst);
                    failure.get_or_insert_with(|| {
                        Error::new(ErrorKind::Internal, "bulk load worker exited without a result".to_string())
                    });
                    break;
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(outputs.into_iter().flatten().collect())
    }
}

fn run_worker(context: &WorkerContext, ordinals: Range<usize>) -> Result<WorkerOutput> {
    let name = thread::current().name().unwrap_or("bulk-loader").to_string();
    tracing::debug!(worker = %name, start = ordinals.start, end = ordinals.end, "worker started");

    // Phase 1: generate, buffering mothers per destination shard
    let mut mother_buffer: BTreeMap<u32, BTreeMap<MotherId, MotherRecord>> = BTreeMap::new();
    let mut copies: CopyBatch = Vec::new();
    let chunk_len = ordinals.len();

    for (done, ordinal) in ordinals.enumerate() {
        check_cancelled(context)?;

        let mother_id = MotherId::from_ordinal(&context.family_code, ordinal, context.capacity);
        let GeneratedBook { mut record, copies: generated } = context.source.generate(&mother_id)?;

        record.copies = mother_id.copy_ids(generated.len() as u32);
        for (copy_id, mut copy) in record.copies.iter().cloned().zip(generated) {
            copy.mother_id = mother_id.clone();
            copies.push((copy_id, copy));
        }
        mother_buffer
            .entry(mother_id.shard)
            .or_default()
            .insert(mother_id, record);

        context.progress.fetch_add(1, Ordering::Relaxed);
        if (done + 1) % 10_000 == 0 {
            tracing::debug!(worker = %name, generated = done + 1, of = chunk_len, "worker progress");
        }
    }

    // Phase 2: merge into mother shards, one shard at a time under the
    // global write lock
    let mother_shards: Vec<u32> = mother_buffer.keys().copied().collect();
    for (index, records) in mother_buffer {
        check_cancelled(context)?;

        let _write_guard = context.write_lock.lock();
        let path = context.layout.shard_path(ShardFamily::Mother, index);
        context.locks.with_lock(&path, || {
            let mut shard = MotherShard::load_or_empty(&context.layout, ShardFamily::Mother, index)?;
            shard.records.extend(records);
            shard.save()
        })?;
    }

    tracing::debug!(worker = %name, mothers = chunk_len, copies = copies.len(), "worker finished");
    Ok(WorkerOutput { copies, mother_shards })
}

fn check_cancelled(context: &WorkerContext) -> Result<()> {
    if context.cancelled.load(Ordering::SeqCst) {
        return Err(Error::new(ErrorKind::Cancelled, "bulk load cancelled".to_string()));
    }
    Ok(())
}

/// Phase 3: sort every copy in natural ID order and fill copy shards
/// sequentially, moving to a new shard exactly when one reaches capacity.
pub fn write_sorted_copies(
    mut copies: CopyBatch,
    cursor: &mut AllocatorGuard<'_, CopyId, CopyRecord>,
    capacity: usize,
) -> Result<Vec<BoundaryEntry>> {
    copies.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut pending = copies.into_iter().peekable();
    let mut written = Vec::new();

    while pending.peek().is_some() {
        let entry = cursor.with_open_shard(|shard| {
            let room = shard.remaining(capacity);
            let mut range: Option<(MotherId, MotherId)> = None;
            for (copy_id, record) in pending.by_ref().take(room) {
                let owner = copy_id.mother_id().clone();
                range = match range {
                    None => Some((owner.clone(), owner)),
                    Some((first, _)) => Some((first, owner)),
                };
                shard.insert(copy_id, record);
            }
            Ok(range.map(|(first, last)| BoundaryEntry {
                file_name: shard.file_name(),
                first,
                last,
            }))
        })?;
        written.extend(entry);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_ordinal_once() {
        let ranges = BulkLoader::partition(1, 10, 3);
        assert_eq!(ranges, vec![1..4, 4..7, 7..11]);
    }

    #[test]
    fn partition_skips_empty_chunks() {
        let ranges = BulkLoader::partition(5, 2, 4);
        assert_eq!(ranges, vec![5..7]);
        assert!(BulkLoader::partition(1, 0, 4).is_empty());
    }
}
