/// Bibliox catalog walkthrough
///
/// Demonstrates the main catalog operations:
/// - Adding books with copies
/// - Reading records and their copies
/// - Field updates (lending a copy)
/// - Bulk loading
/// - Index rebuild and search
/// - Statistics

use Bibliox::core::catalog::Catalog;
use Bibliox::core::config::Config;
use Bibliox::core::error::Result;
use Bibliox::core::types::{CopyRecord, CopyStatus, MotherId, NewBook};
use Bibliox::index::query::IndexQuery;
use Bibliox::parallel::bulk_loader::{GeneratedBook, RecordSource};
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;

/// Numbered filler books with two copies each
struct DemoSource;

impl RecordSource for DemoSource {
    fn generate(&self, mother_id: &MotherId) -> Result<GeneratedBook> {
        let record = NewBook::new(format!("馆藏样书 {}", mother_id), "佚名")
            .with_category("样书")
            .into_record(NaiveDateTime::default(), Vec::new());
        let copies = vec![CopyRecord::new(mother_id.clone()); 2];
        Ok(GeneratedBook { record, copies })
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        Bibliox Catalog - API Walkthrough      ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Open the catalog
    let base = std::env::temp_dir().join("bibliox-demo");
    let _ = std::fs::remove_dir_all(&base);
    let catalog = Catalog::open(Config::new(&base))?;
    println!("Opened catalog under {}\n", base.display());

    // Step 2: Add books
    println!("Step 2: Adding books...");
    let three_body = catalog.add_record(
        NewBook::new("三体", "刘慈欣").with_category("科幻").with_publisher("重庆出版社"),
        3,
    )?;
    let fortress = catalog.add_record_text(NewBook::new("围城", "钱锺书").with_category("小说"), "2")?;
    println!("  added {} and {}\n", three_body, fortress);

    // Step 3: Read back
    println!("Step 3: Reading records...");
    let record = catalog.get_record(&three_body.to_string())?;
    println!("  {} by {} ({} copies)", record.title, record.author, record.copies.len());
    for (copy_id, copy) in catalog.get_copies(&three_body.to_string())? {
        println!("    {} [{}]", copy_id, copy.status);
    }
    println!();

    // Step 4: Lend a copy
    println!("Step 4: Lending a copy...");
    let copy_id = three_body.copy_id(1).to_string();
    catalog.update_copy_field(&copy_id, "status", json!(CopyStatus::Loaned.as_str()))?;
    catalog.update_copy_field(&copy_id, "borrower_name", json!("张三"))?;
    catalog.update_copy_field(&copy_id, "borrow_date", json!("2024-03-01 09:30:00"))?;
    catalog.update_copy_field(&copy_id, "due_date", json!("2024-03-31 09:30:00"))?;
    println!("  {} lent to 张三\n", copy_id);

    // Step 5: Bulk load
    println!("Step 5: Bulk loading 5000 records...");
    let report = catalog.bulk_load(5_000, Arc::new(DemoSource))?;
    println!(
        "  {} mothers, {} copies, {} copy shards in {:?}\n",
        report.mothers,
        report.copies,
        report.copy_shards.len(),
        report.elapsed
    );

    // Step 6: Rebuild indexes and search
    println!("Step 6: Rebuilding indexes...");
    let stats = catalog.rebuild_indexes()?;
    println!("  indexed {} mothers and {} copies in {}ms", stats.mothers, stats.copies, stats.elapsed_ms);

    for query in [
        IndexQuery::new().term("刘慈欣"),
        IndexQuery::new().category("小说"),
        IndexQuery::new().status(CopyStatus::Loaned),
    ] {
        let hits = catalog.search(&query)?;
        println!("  {:?} -> {} hit(s)", query, hits.len());
        for (id, record) in hits.iter().take(3) {
            println!("    {} {}", id, record.title);
        }
    }
    println!();

    // Step 7: Statistics
    println!("Step 7: Statistics");
    let stats = catalog.stats()?;
    println!("  mother shards: {} ({} records)", stats.mother.shard_count, stats.mother.record_count);
    println!("  copy shards:   {} ({} records)", stats.copy.shard_count, stats.copy.record_count);
    println!("  shards for {}: {:?}", three_body, catalog.find_relevant_shards(&three_body.to_string())?);

    println!("\nDone!");
    Ok(())
}
