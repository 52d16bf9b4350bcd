use std::sync::Arc;

use log::warn;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::{BufferPoolManager, FrameHeader};

/// A pinned page: the page number plus access to the frame holding it.
///
/// The handle stays valid until the matching `unpin_page`; after that the
/// frame may be reused for another page.
pub struct PageHandle {
    page_id: PageId,
    frame: Arc<FrameHeader>,
}

impl PageHandle {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>) -> Self {
        Self { page_id, frame }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns a read lock on the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Returns a write lock on the page bytes. Does not mark the page dirty;
    /// pair it with `BufferPoolManager::mark_dirty`.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.write_data()
    }
}

/// RAII guard over a pinned page.
/// Marks the page dirty if it was written through the guard, and unpins it
/// when dropped, including on early returns and error paths.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    handle: PageHandle,
    is_dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, handle: PageHandle) -> Self {
        Self {
            bpm,
            handle,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.handle.page_id()
    }

    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.handle.data()
    }

    /// Returns a write lock on the page bytes and marks the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.is_dirty = true;
        self.handle.data_mut()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let page_id = self.handle.page_id();
        if self.is_dirty {
            if let Err(e) = self.bpm.mark_dirty(page_id) {
                warn!("Failed to mark {} dirty: {}", page_id, e);
            }
        }
        if let Err(e) = self.bpm.unpin_page(page_id) {
            warn!("Failed to unpin {}: {}", page_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ReplacementPolicy;
    use crate::storage::disk::DiskManager;
    use tempfile::TempDir;

    fn create_bpm(dir: &TempDir) -> BufferPoolManager {
        let path = dir.path().join("guard.bin");
        DiskManager::create(&path).unwrap();
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        dm.ensure_capacity(2).unwrap();
        BufferPoolManager::new(2, ReplacementPolicy::Fifo, dm).unwrap()
    }

    #[test]
    fn test_read_guard_unpins() {
        let dir = TempDir::new().unwrap();
        let bpm = create_bpm(&dir);

        let guard = bpm.fetch_page(PageId::new(1)).unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(bpm.pin_count(PageId::new(1)), Some(1));
        assert_eq!(guard.data()[0], 0);

        drop(guard);
        assert_eq!(bpm.pin_count(PageId::new(1)), Some(0));
        assert_eq!(bpm.dirty_flags(), vec![false, false]);
    }

    #[test]
    fn test_write_guard_marks_dirty() {
        let dir = TempDir::new().unwrap();
        let bpm = create_bpm(&dir);

        {
            let mut guard = bpm.fetch_page(PageId::new(0)).unwrap();
            guard.data_mut()[0] = 42;
        }

        assert_eq!(bpm.dirty_flags(), vec![true, false]);
        let handle = bpm.pin_page(PageId::new(0)).unwrap();
        assert_eq!(handle.data()[0], 42);
        bpm.unpin_page(PageId::new(0)).unwrap();
    }
}
