mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use Bibliox::core::catalog::Catalog;
use Bibliox::core::error::ErrorKind;
use Bibliox::core::types::{CopyId, MotherId};
use Bibliox::storage::layout::ShardFamily;
use Bibliox::storage::shard::{CopyShard, MotherShard};
use common::{book, test_config, FailingSource, FixedSource, LateFailingSource, RandomSource, SlowSource};

fn copy_keys_by_shard(catalog: &Catalog) -> Vec<Vec<CopyId>> {
    let layout = catalog.layout();
    layout
        .list_shards(ShardFamily::Copy)
        .unwrap()
        .into_iter()
        .map(|index| {
            CopyShard::load(layout, ShardFamily::Copy, index)
                .unwrap()
                .iter()
                .map(|(id, _)| id.clone())
                .collect()
        })
        .collect()
}

#[test]
fn bulk_load_fills_shards_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 50)).unwrap();

    let report = catalog.bulk_load(200, Arc::new(RandomSource)).unwrap();
    assert_eq!(report.mothers, 200);
    assert_eq!(report.mother_shards, vec![1, 2, 3, 4]);
    assert_eq!(catalog.bulk_progress(), 200);

    let layout = catalog.layout();
    for index in 1..=4 {
        let shard = MotherShard::load(layout, ShardFamily::Mother, index).unwrap();
        assert_eq!(shard.len(), 50);
        let seqs: Vec<u32> = shard.iter().map(|(id, _)| id.seq).collect();
        assert_eq!(seqs, (1..=50).collect::<Vec<_>>());
    }

    // Copy shards are full except the last and never overlap
    let shards = copy_keys_by_shard(&catalog);
    let total: usize = shards.iter().map(Vec::len).sum();
    assert_eq!(total, report.copies);
    for (i, keys) in shards.iter().enumerate() {
        if i + 1 < shards.len() {
            assert_eq!(keys.len(), 50, "copy shard {}", i + 1);
        }
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
    for pair in shards.windows(2) {
        assert!(pair[0].last().unwrap() < pair[1].first().unwrap());
    }
    assert_eq!(report.copy_shards.len(), shards.len());
}

#[test]
fn every_mother_lists_exactly_its_copies() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 20)).unwrap();
    catalog.bulk_load(120, Arc::new(RandomSource)).unwrap();

    for ordinal in 1..=120 {
        let id = MotherId::from_ordinal("1", ordinal, 20);
        let record = catalog.get_record(&id.to_string()).unwrap();
        let copies = catalog.get_copies(&id.to_string()).unwrap();
        let copy_ids: Vec<CopyId> = copies.iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(record.copies, copy_ids, "mother {}", id);
        assert!(!copy_ids.is_empty() && copy_ids.len() <= 5);
        assert!(copies.iter().all(|(_, c)| c.mother_id == id));
    }
}

#[test]
fn bulk_load_appends_after_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 999)).unwrap();
    for title in ["甲", "乙", "丙"] {
        catalog.add_record(book(title, "作者", "小说"), 1).unwrap();
    }

    let report = catalog.bulk_load(10, Arc::new(FixedSource { copies: 2 })).unwrap();
    assert_eq!(report.copies, 20);

    assert_eq!(catalog.get_record("1-1-001").unwrap().title, "甲");
    for seq in 4..=13 {
        let id = MotherId::new("1", 1, seq).to_string();
        assert_eq!(catalog.get_copies(&id).unwrap().len(), 2, "mother {}", id);
    }

    // Allocation picks up after the load without a reopen
    let next = catalog.add_record(book("丁", "作者", "小说"), 1).unwrap();
    assert_eq!(next.to_string(), "1-1-014");
    assert_eq!(catalog.get_copies("1-1-014").unwrap().len(), 1);

    catalog.rebuild_indexes().unwrap();
    assert_eq!(catalog.stats().unwrap().copy.record_count, 24);
}

#[test]
fn bulk_load_spans_a_partially_filled_shard() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 10)).unwrap();
    for _ in 0..7 {
        catalog.add_record(book("甲", "作者", "小说"), 1).unwrap();
    }

    let report = catalog.bulk_load(8, Arc::new(FixedSource { copies: 3 })).unwrap();
    assert_eq!(report.mother_shards, vec![1, 2]);

    let layout = catalog.layout();
    assert_eq!(MotherShard::load(layout, ShardFamily::Mother, 1).unwrap().len(), 10);
    assert_eq!(MotherShard::load(layout, ShardFamily::Mother, 2).unwrap().len(), 5);
    assert_eq!(catalog.get_copies("1-2-005").unwrap().len(), 3);
    assert_eq!(catalog.get_copies("1-1-008").unwrap().len(), 3);
}

#[test]
fn zero_records_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 999)).unwrap();
    let err = catalog.bulk_load(0, Arc::new(RandomSource)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn worker_failure_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 999)).unwrap();

    let source = FailingSource { fail_on: MotherId::new("1", 1, 37) };
    let err = catalog.bulk_load(100, Arc::new(source)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);

    // No copies were written for a failed load
    assert!(copy_keys_by_shard(&catalog).iter().all(Vec::is_empty));
}

#[test]
fn slow_workers_time_out_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), 999).with_loader_workers(2);
    config.loader_worker_timeout_secs = 1;
    let catalog = Catalog::open(config).unwrap();

    let source = SlowSource { delay: Duration::from_millis(50) };
    let err = catalog.bulk_load(200, Arc::new(source)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);

    let generated = catalog.bulk_progress();
    let stored = catalog.stats().unwrap().mother.record_count;
    thread::sleep(Duration::from_millis(300));
    assert_eq!(catalog.bulk_progress(), generated);
    assert_eq!(catalog.stats().unwrap().mother.record_count, stored);

    let id = catalog.add_record(book("边城", "沈从文", "小说"), 2).unwrap();
    assert_eq!(catalog.get_copies(&id.to_string()).unwrap().len(), 2);
}

#[test]
fn add_after_a_partially_merged_load_skips_taken_seqs() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 999)).unwrap();

    // Worker 0 fails late; workers 1..4 have merged 1-1-101..=1-1-400 by then
    let source = LateFailingSource {
        fail_on: MotherId::new("1", 1, 1),
        delay: Duration::from_millis(300),
    };
    let err = catalog.bulk_load(400, Arc::new(source)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);

    let shard = MotherShard::load(catalog.layout(), ShardFamily::Mother, 1).unwrap();
    let highest = shard.records.keys().last().unwrap().seq;
    assert!(highest as usize > shard.len());

    let id = catalog.add_record(book("边城", "沈从文", "小说"), 2).unwrap();
    assert_eq!(id, MotherId::new("1", 1, highest + 1));
    assert_eq!(catalog.get_record(&id.to_string()).unwrap().title, "边城");
    assert_eq!(catalog.get_copies(&id.to_string()).unwrap().len(), 2);

    let next = catalog.add_record(book("围城", "钱锺书", "小说"), 1).unwrap();
    assert_eq!(next, MotherId::new("1", 1, highest + 2));
}

#[test]
fn cancel_stops_a_running_load() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(test_config(dir.path(), 999).with_loader_workers(2)).unwrap();

    let result = thread::scope(|scope| {
        let loader = scope.spawn(|| {
            catalog.bulk_load(1_000, Arc::new(SlowSource { delay: Duration::from_millis(20) }))
        });
        while catalog.bulk_progress() == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        catalog.cancel_bulk_load();
        loader.join().unwrap()
    });

    assert_eq!(result.unwrap_err().kind, ErrorKind::Cancelled);
}
