use thiserror::Error;

use super::types::PageId;

/// Error type shared by the block store, the buffer pool and the index
#[derive(Error, Debug)]
pub enum ArborError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page file not found: {0}")]
    FileNotFound(String),

    #[error("Read past end of file: {page_id} (file has {num_pages} pages)")]
    ReadPastEnd { page_id: PageId, num_pages: u32 },

    #[error("Write failed for {0}")]
    WriteFailed(PageId),

    #[error("Buffer pool is full, every frame is pinned")]
    NoFreeFrame,

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Buffer pool still has {pinned} pinned frames")]
    PoolBusy { pinned: usize },

    #[error("Allocation failed: {0}")]
    AllocationError(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    DuplicateIndex(String),

    #[error("Key already exists: {0}")]
    KeyAlreadyExists(String),

    #[error("Key not found")]
    KeyNotFound,

    #[error("No more entries")]
    NoMoreEntries,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, ArborError>;
