//! Arbor - a page cache and B+Tree index over fixed-size disk pages
//!
//! Arbor provides the storage-side building blocks of a record store: a
//! buffer pool that keeps a bounded number of 4 KiB pages in memory, and an
//! ordered index that maps typed keys to record locators (page, slot).
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page-granular file I/O
//!   - `DiskManager`: creates, opens, reads, writes and extends page files
//!
//! - **Buffer Pool** (`buffer`): page caching on top of the disk manager
//!   - `BufferPoolManager`: pins pages into frames, writes dirty pages back
//!   - `FifoReplacer`/`LruReplacer`: victim selection on a miss
//!   - `PageGuard`: RAII pin that unpins on drop
//!
//! - **Keys** (`tuple`): `DataType` and `Value`, the four key types an index
//!   can be declared over
//!
//! - **Index** (`index`): the B+Tree
//!   - `BTreeIndex`: search, insert, delete, persistence to the index file
//!   - `TreeScan`: ordered scan over the leaf chain
//!
//! # Example
//!
//! ```rust,no_run
//! use arbor::index::BTreeIndex;
//! use arbor::tuple::{DataType, Value};
//! use arbor::{PageId, RecordId, SlotId};
//!
//! BTreeIndex::create("names.idx", DataType::String, 4).unwrap();
//! let mut index = BTreeIndex::open("names.idx").unwrap();
//!
//! let rid = RecordId::new(PageId::new(3), SlotId::new(1));
//! index.insert(Value::from("ada"), rid).unwrap();
//! assert_eq!(index.search(&Value::from("ada")).unwrap(), rid);
//!
//! for (key, rid) in index.open_scan() {
//!     println!("{} -> {}", key, rid);
//! }
//!
//! // Writes the nodes and header back to names.idx
//! index.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{ArborError, PageId, RecordId, Result, SlotId};
