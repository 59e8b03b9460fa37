use std::sync::Arc;

use strata::buffer::BufferPoolManager;
use strata::common::{PageId, RecordId, SlotId, HEADER_PAGE_ID};
use strata::index::BTreeIndex;
use strata::storage::disk::DiskManager;

fn main() {
    println!("Strata - storage core of a disk-oriented RDBMS");
    println!("==============================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // 16 frames, LRU-2 replacement
    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames");

    // The first allocated page is the header page holding index roots
    let header = bpm.new_page().expect("Failed to allocate header page");
    assert_eq!(header, HEADER_PAGE_ID);
    bpm.unpin_page(header, true).expect("Failed to unpin header page");

    let index =
        BTreeIndex::new("demo_index", Arc::clone(&bpm), 4, 4).expect("Failed to create index");
    println!("Created B+Tree index 'demo_index'\n");

    for key in [15u32, 3, 27, 8, 42, 1, 19, 33, 11, 6] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        index.insert(key, rid).expect("Insert failed");
        println!("Inserted key {}", key);
    }

    println!("\nPoint query for key 27:");
    for rid in index.get_value(27).expect("Lookup failed") {
        println!("  -> {:?}", rid);
    }

    println!("\nOrdered scan from key 10:");
    let iter = index.begin_at(10).expect("Failed to position iterator");
    for entry in iter {
        let (key, rid) = entry.expect("Scan failed");
        println!("  {} -> page {}", key, rid.page_id);
    }

    for key in [3u32, 27, 11] {
        index.remove(key).expect("Remove failed");
        println!("Removed key {}", key);
    }

    println!("\nFull scan after removals:");
    let iter = index.begin().expect("Failed to position iterator");
    for entry in iter {
        let (key, _) = entry.expect("Scan failed");
        print!("{} ", key);
    }
    println!();

    bpm.flush_all_pages().expect("Flush failed");
    println!("\nFlushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}
