use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// One slot of the buffer pool. Holds at most one page's bytes plus the
/// bookkeeping the pool needs to decide whether the slot can be reused.
///
/// A frame whose page ID is `INVALID_PAGE_ID` is empty and its bytes carry no
/// meaning. A frame with pin count 0 is eligible for eviction.
pub struct FrameHeader {
    frame_id: FrameId,
    page_id: RwLock<PageId>,
    /// Number of outstanding holders of this frame
    pin_count: AtomicU32,
    /// Frame content differs from what is on disk
    is_dirty: AtomicBool,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    /// Returns the resident page, or None for an empty frame.
    pub fn resident_page(&self) -> Option<PageId> {
        let page_id = self.page_id();
        (page_id != INVALID_PAGE_ID).then_some(page_id)
    }

    pub fn is_empty(&self) -> bool {
        self.page_id() == INVALID_PAGE_ID
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0; the count never goes negative.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Installs a freshly read page: content, page ID, clean, pinned once.
    pub fn load(&self, page_id: PageId, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
        *self.page_id.write() = page_id;
        self.is_dirty.store(false, Ordering::Release);
        self.pin_count.store(1, Ordering::Release);
    }

    /// Copies the frame content into the given slice.
    pub fn copy_to(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.copy_from_slice(&**self.data.read());
    }

    /// Returns the frame to the empty state.
    pub fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_new() {
        let frame = FrameHeader::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert!(frame.is_empty());
        assert_eq!(frame.resident_page(), None);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_header_pin_unpin() {
        let frame = FrameHeader::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);

        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_frame_header_load() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_dirty(true);

        let mut data = [0u8; PAGE_SIZE];
        data[7] = 99;
        frame.load(PageId::new(5), &data);

        assert_eq!(frame.resident_page(), Some(PageId::new(5)));
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[7], 99);
    }

    #[test]
    fn test_frame_header_reset() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.load(PageId::new(5), &[1u8; PAGE_SIZE]);
        frame.set_dirty(true);

        frame.reset();

        assert!(frame.is_empty());
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());

        let mut data = [9u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        assert_eq!(data[0], 0);
    }
}
