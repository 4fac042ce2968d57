#![allow(dead_code)]

use std::fs;
use std::path::Path;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use Bibliox::core::config::Config;
use Bibliox::core::error::{Error, ErrorKind, Result};
use Bibliox::core::types::{CopyRecord, CopyStatus, MotherId, MotherRecord, NewBook};
use Bibliox::parallel::bulk_loader::{GeneratedBook, RecordSource};

pub fn test_config(dir: &Path, capacity: usize) -> Config {
    Config::new(dir)
        .with_shard_capacity(capacity)
        .with_loader_workers(4)
}

pub fn book(title: &str, author: &str, category: &str) -> NewBook {
    NewBook {
        title: title.to_string(),
        author: author.to_string(),
        publisher: "测试出版社".to_string(),
        catalog_code: "978-7-12345-67-8".to_string(),
        pages: "320".to_string(),
        words: "25万字".to_string(),
        category: category.to_string(),
    }
}

pub fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap()
}

pub fn read_json(path: &Path) -> serde_json::Map<String, serde_json::Value> {
    let text = fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Random content, 1..=5 copies per mother, roughly a third loaned.
pub struct RandomSource;

impl RecordSource for RandomSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        let mut rng = rand::thread_rng();
        let categories = ["小说", "科技", "历史", "传记", "艺术"];
        let record = MotherRecord {
            title: format!("第{}卷", mother_id.seq),
            author: format!("作者{}", rng.gen_range(0..20)),
            publisher: "测试出版社".to_string(),
            catalog_code: format!("978-7-{:05}-{:02}-{}", rng.gen_range(10000..99999), rng.gen_range(10..99), rng.gen_range(0..9)),
            pages: rng.gen_range(100..800).to_string(),
            words: format!("{}万字", rng.gen_range(5..100)),
            category: categories[rng.gen_range(0..categories.len())].to_string(),
            created_at: base_time(),
            copies: Vec::new(),
        };

        let quantity = rng.gen_range(1..=5);
        let copies = (0..quantity)
            .map(|_| {
                if rng.gen_bool(0.3) {
                    let loaned_at = base_time() + Duration::days(rng.gen_range(1..30));
                    CopyRecord::loaned(
                        mother_id.clone(),
                        "张三",
                        loaned_at,
                        loaned_at + Duration::days(rng.gen_range(7..30)),
                        None,
                    )
                } else {
                    CopyRecord::new(mother_id.clone())
                }
            })
            .collect();

        Ok(GeneratedBook { record, copies })
    }
}

/// Exactly `copies` normal copies per mother.
pub struct FixedSource {
    pub copies: usize,
}

impl RecordSource for FixedSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        let record = book(&format!("书{}", mother_id), "固定作者", "计算机").into_record(base_time(), Vec::new());
        let copies = (0..self.copies)
            .map(|_| CopyRecord::new(mother_id.clone()).with_status(CopyStatus::Normal))
            .collect();
        Ok(GeneratedBook { record, copies })
    }
}

/// Fails on one specific mother.
pub struct FailingSource {
    pub fail_on: MotherId,
}

impl RecordSource for FailingSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        if mother_id == &self.fail_on {
            return Err(Error::new(ErrorKind::Internal, format!("cannot generate {}", mother_id)));
        }
        FixedSource { copies: 1 }.generate(mother_id)
    }
}

/// Sleeps before every record.
pub struct SlowSource {
    pub delay: std::time::Duration,
}

impl RecordSource for SlowSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        std::thread::sleep(self.delay);
        FixedSource { copies: 1 }.generate(mother_id)
    }
}

/// Fails on one mother after a pause, giving the other workers time to
/// merge their mothers first.
pub struct LateFailingSource {
    pub fail_on: MotherId,
    pub delay: std::time::Duration,
}

impl RecordSource for LateFailingSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        if mother_id == &self.fail_on {
            std::thread::sleep(self.delay);
            return Err(Error::new(ErrorKind::Internal, format!("cannot generate {}", mother_id)));
        }
        FixedSource { copies: 1 }.generate(mother_id)
    }
}
