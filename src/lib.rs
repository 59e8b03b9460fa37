//! Strata - the storage-access core of a disk-oriented RDBMS in Rust
//!
//! This crate turns a fixed pool of in-memory frames and an on-disk page
//! file into a concurrent, indexable key/value store. It stops at the
//! storage boundary: no SQL, no executors, no transactions.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page-granularity disk I/O
//!   - `DiskManager`: reads and writes 4 KiB pages against the database file
//!   - `DiskScheduler`: background worker thread funneling disk requests
//!   - `HeaderPage`: the fixed page 0 that records root page ids of named indexes
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in frames, evicting with LRU-K
//!   - `LruKReplacer`: backward-k-distance victim selection
//!   - `FrameHeader`: per-frame metadata and page bytes
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin/unpin around page access
//!
//! - **Containers** (`container`): `ExtendibleHashTable`, a concurrent hash
//!   map with directory doubling - also the buffer pool's page table
//!
//! - **Index** (`index`): `BTreeIndex`, a disk-resident B+Tree over the
//!   buffer pool, with `BTreeIterator` for ordered scans
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::common::{PageId, RecordId, SlotId, HEADER_PAGE_ID};
//! use strata::index::BTreeIndex;
//! use strata::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // Page 0 is the header page; allocate it before the first index
//! let header = bpm.new_page().unwrap();
//! assert_eq!(header, HEADER_PAGE_ID);
//! bpm.unpin_page(header, true).unwrap();
//!
//! let index = BTreeIndex::new("orders_pk", Arc::clone(&bpm), 64, 64).unwrap();
//! index.insert(42, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert_eq!(index.get_value(42).unwrap().len(), 1);
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError};
