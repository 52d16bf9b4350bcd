use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{
    ArborError, BufferPoolConfig, FrameId, PageId, ReplacementPolicy, Result, PAGE_SIZE,
};
use crate::storage::disk::DiskManager;

use super::{make_replacer, FrameHeader, PageGuard, PageHandle, Replacer};

/// Mutable pool state, guarded by a single mutex
struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames that have never held a page, lowest index first
    free_list: VecDeque<FrameId>,
    /// Eviction policy, fixed for the pool's lifetime
    replacer: Box<dyn Replacer>,
    /// Blocks read from disk by this pool
    num_reads: u64,
    /// Blocks written to disk by this pool
    num_writes: u64,
    /// Cleared by a successful shutdown
    is_open: bool,
}

/// BufferPoolManager caches the pages of one page file in a fixed number of
/// frames. Every page access goes through pin/unpin; a miss loads the page
/// into an empty frame or into a victim chosen by the configured policy,
/// writing the victim back first if it is dirty.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    policy: ReplacementPolicy,
    state: Mutex<BufferPoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Opens a buffer pool over the page file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: BufferPoolConfig) -> Result<Self> {
        let disk_manager = Arc::new(DiskManager::open(path)?);
        Self::new(config.pool_size, config.policy, disk_manager)
    }

    /// Creates a buffer pool of `pool_size` empty frames over the given disk manager.
    pub fn new(
        pool_size: usize,
        policy: ReplacementPolicy,
        disk_manager: Arc<DiskManager>,
    ) -> Result<Self> {
        if pool_size == 0 {
            return Err(ArborError::InvalidArgument(
                "buffer pool needs at least one frame".to_string(),
            ));
        }

        let mut frames = Vec::new();
        frames
            .try_reserve_exact(pool_size)
            .map_err(|e| ArborError::AllocationError(e.to_string()))?;
        let mut free_list = VecDeque::new();
        free_list
            .try_reserve_exact(pool_size)
            .map_err(|e| ArborError::AllocationError(e.to_string()))?;

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        debug!(
            "Opened buffer pool over {} with {} frames ({})",
            disk_manager.get_db_path(),
            pool_size,
            policy
        );

        Ok(Self {
            pool_size,
            policy,
            state: Mutex::new(BufferPoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: make_replacer(policy, pool_size),
                num_reads: 0,
                num_writes: 0,
                is_open: true,
            }),
            disk_manager,
        })
    }

    /// Pins a page, loading it from disk on a miss.
    /// The caller must unpin the page once done with the handle.
    pub fn pin_page(&self, page_id: PageId) -> Result<PageHandle> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = Arc::clone(&state.frames[frame_id.as_usize()]);
            frame.pin();
            state.replacer.record_hit(frame_id);
            state.replacer.set_evictable(frame_id, false);
            return Ok(PageHandle::new(page_id, frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = Arc::clone(&state.frames[frame_id.as_usize()]);

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_manager.read_page(page_id, &mut data) {
            state.free_list.push_front(frame_id);
            return Err(e);
        }
        state.num_reads += 1;

        frame.load(page_id, &data);
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_load(frame_id);
        state.replacer.set_evictable(frame_id, false);

        debug!("Loaded {} into {}", page_id, frame_id);
        Ok(PageHandle::new(page_id, frame))
    }

    /// Pins a page and wraps it in a guard that unpins it when dropped.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let handle = self.pin_page(page_id)?;
        Ok(PageGuard::new(self, handle))
    }

    /// Appends an empty page to the file and pins it.
    pub fn new_page(&self) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = match self.disk_manager.append_empty_block() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };

        let frame = Arc::clone(&state.frames[frame_id.as_usize()]);
        frame.load(page_id, &[0u8; PAGE_SIZE]);
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_load(frame_id);
        state.replacer.set_evictable(frame_id, false);
        drop(state);

        Ok(PageGuard::new(self, PageHandle::new(page_id, frame)))
    }

    /// Releases one pin on a resident page.
    pub fn unpin_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        let frame_id = Self::lookup(&state, page_id)?;
        match state.frames[frame_id.as_usize()].unpin() {
            Some(0) => {
                state.replacer.set_evictable(frame_id, true);
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(ArborError::InvalidArgument(format!(
                "{} is not pinned",
                page_id
            ))),
        }
    }

    /// Marks a resident page as modified.
    pub fn mark_dirty(&self, page_id: PageId) -> Result<()> {
        let state = self.state.lock();
        Self::check_open(&state)?;

        let frame_id = Self::lookup(&state, page_id)?;
        state.frames[frame_id.as_usize()].set_dirty(true);
        Ok(())
    }

    /// Writes a resident page back to disk, pinned or not, and clears its dirty flag.
    pub fn force_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        let frame_id = Self::lookup(&state, page_id)?;
        let frame = Arc::clone(&state.frames[frame_id.as_usize()]);
        self.write_back(&mut state, &frame)
    }

    /// Writes every dirty, unpinned frame back to disk.
    pub fn force_flush_pool(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        self.flush_unpinned(&mut state)
    }

    /// Flushes the pool and releases its frames.
    /// Fails with `PoolBusy` while any frame is still pinned; the frames stay
    /// allocated in that case.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;

        self.flush_unpinned(&mut state)?;

        let pinned = state.frames.iter().filter(|f| f.pin_count() > 0).count();
        if pinned > 0 {
            return Err(ArborError::PoolBusy { pinned });
        }

        state.frames.clear();
        state.page_table.clear();
        state.free_list.clear();
        state.is_open = false;
        self.disk_manager.sync()?;

        debug!("Shut down buffer pool over {}", self.disk_manager.get_db_path());
        Ok(())
    }

    /// Page number held by each frame, None for an empty frame.
    pub fn frame_contents(&self) -> Vec<Option<PageId>> {
        let state = self.state.lock();
        state.frames.iter().map(|f| f.resident_page()).collect()
    }

    /// Dirty flag of each frame.
    pub fn dirty_flags(&self) -> Vec<bool> {
        let state = self.state.lock();
        state.frames.iter().map(|f| f.is_dirty()).collect()
    }

    /// Pin count of each frame.
    pub fn fix_counts(&self) -> Vec<u32> {
        let state = self.state.lock();
        state.frames.iter().map(|f| f.pin_count()).collect()
    }

    /// Number of pages read from disk since the pool was opened.
    pub fn num_read_io(&self) -> u64 {
        self.state.lock().num_reads
    }

    /// Number of pages written to disk since the pool was opened.
    pub fn num_write_io(&self) -> u64 {
        self.state.lock().num_writes
    }

    /// Returns the pin count for a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }

    /// Returns the number of frames that have never held a page.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk_manager
    }

    fn check_open(state: &BufferPoolState) -> Result<()> {
        if state.is_open {
            Ok(())
        } else {
            Err(ArborError::InvalidArgument(
                "buffer pool has been shut down".to_string(),
            ))
        }
    }

    fn lookup(state: &BufferPoolState, page_id: PageId) -> Result<FrameId> {
        state
            .page_table
            .get(&page_id)
            .copied()
            .ok_or(ArborError::PageNotResident(page_id))
    }

    fn write_back(&self, state: &mut BufferPoolState, frame: &FrameHeader) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_manager.write_page(frame.page_id(), &data)?;
        frame.set_dirty(false);
        state.num_writes += 1;
        debug!("Wrote {} back from {}", frame.page_id(), frame.frame_id());
        Ok(())
    }

    fn flush_unpinned(&self, state: &mut BufferPoolState) -> Result<()> {
        let dirty: Vec<Arc<FrameHeader>> = state
            .frames
            .iter()
            .filter(|f| !f.is_empty() && f.is_dirty() && f.pin_count() == 0)
            .cloned()
            .collect();

        for frame in dirty {
            self.write_back(state, &frame)?;
        }
        Ok(())
    }

    /// Gets a frame to load into, either an empty one or an evicted one.
    fn acquire_frame(&self, state: &mut BufferPoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        // The replacer forgets the victim only once its page is safely on disk
        let frame_id = state.replacer.victim().ok_or(ArborError::NoFreeFrame)?;
        let frame = Arc::clone(&state.frames[frame_id.as_usize()]);
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            self.write_back(state, &frame)?;
        }
        state.replacer.remove(frame_id);

        debug!("Evicted {} from {}", old_page_id, frame_id);
        state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.is_open {
            if let Err(e) = self.flush_unpinned(&mut state) {
                warn!(
                    "Failed to flush buffer pool over {}: {}",
                    self.disk_manager.get_db_path(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_bpm(pool_size: usize, num_pages: u32) -> (BufferPoolManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.bin");
        DiskManager::create(&path).unwrap();
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        dm.ensure_capacity(num_pages).unwrap();
        let bpm = BufferPoolManager::new(pool_size, ReplacementPolicy::Lru, dm).unwrap();
        (bpm, dir)
    }

    #[test]
    fn test_buffer_pool_manager_new() {
        let (bpm, _dir) = create_bpm(10, 1);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.frame_contents(), vec![None; 10]);
        assert_eq!(bpm.num_read_io(), 0);
        assert_eq!(bpm.num_write_io(), 0);
    }

    #[test]
    fn test_buffer_pool_manager_zero_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.bin");
        DiskManager::create(&path).unwrap();
        let dm = Arc::new(DiskManager::open(&path).unwrap());
        assert!(matches!(
            BufferPoolManager::new(0, ReplacementPolicy::Fifo, dm),
            Err(ArborError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pin_hit_and_miss() {
        let (bpm, _dir) = create_bpm(3, 4);

        let h1 = bpm.pin_page(PageId::new(2)).unwrap();
        assert_eq!(h1.page_id(), PageId::new(2));
        let _h2 = bpm.pin_page(PageId::new(2)).unwrap();

        assert_eq!(bpm.num_read_io(), 1);
        assert_eq!(bpm.pin_count(PageId::new(2)), Some(2));
        assert_eq!(bpm.frame_contents()[0], Some(PageId::new(2)));
        assert_eq!(bpm.fix_counts(), vec![2, 0, 0]);
    }

    #[test]
    fn test_unpin_errors() {
        let (bpm, _dir) = create_bpm(2, 2);

        assert!(matches!(
            bpm.unpin_page(PageId::new(1)),
            Err(ArborError::PageNotResident(_))
        ));

        let _h = bpm.pin_page(PageId::new(1)).unwrap();
        bpm.unpin_page(PageId::new(1)).unwrap();
        assert!(matches!(
            bpm.unpin_page(PageId::new(1)),
            Err(ArborError::InvalidArgument(_))
        ));
        assert_eq!(bpm.pin_count(PageId::new(1)), Some(0));
    }

    #[test]
    fn test_guard_writes_back() {
        let (bpm, _dir) = create_bpm(2, 3);

        {
            let mut guard = bpm.fetch_page(PageId::new(1)).unwrap();
            guard.data_mut()[0] = 42;
        }
        assert_eq!(bpm.pin_count(PageId::new(1)), Some(0));
        assert_eq!(bpm.dirty_flags(), vec![true, false]);

        bpm.force_flush_pool().unwrap();
        assert_eq!(bpm.dirty_flags(), vec![false, false]);
        assert_eq!(bpm.num_write_io(), 1);

        let mut data = [0u8; PAGE_SIZE];
        bpm.disk_manager().read_page(PageId::new(1), &mut data).unwrap();
        assert_eq!(data[0], 42);
    }

    #[test]
    fn test_pool_exhausted() {
        let (bpm, _dir) = create_bpm(2, 3);

        let _h0 = bpm.pin_page(PageId::new(0)).unwrap();
        let _h1 = bpm.pin_page(PageId::new(1)).unwrap();

        assert!(matches!(
            bpm.pin_page(PageId::new(2)),
            Err(ArborError::NoFreeFrame)
        ));

        bpm.unpin_page(PageId::new(0)).unwrap();
        let h2 = bpm.pin_page(PageId::new(2)).unwrap();
        assert_eq!(h2.page_id(), PageId::new(2));
        assert_eq!(bpm.pin_count(PageId::new(0)), None);
    }

    #[test]
    fn test_pin_past_end_keeps_frame() {
        let (bpm, _dir) = create_bpm(1, 1);

        assert!(matches!(
            bpm.pin_page(PageId::new(9)),
            Err(ArborError::ReadPastEnd { .. })
        ));
        assert_eq!(bpm.free_frame_count(), 1);
        assert!(bpm.pin_page(PageId::new(0)).is_ok());
    }

    #[test]
    fn test_new_page() {
        let (bpm, _dir) = create_bpm(2, 1);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[10] = 7;
            guard.page_id()
        };

        assert_eq!(page_id, PageId::new(1));
        assert_eq!(bpm.disk_manager().get_num_pages(), 2);
        assert_eq!(bpm.num_read_io(), 0);

        let guard = bpm.fetch_page(page_id).unwrap();
        assert_eq!(guard.data()[10], 7);
    }

    #[test]
    fn test_shutdown_with_pins() {
        let (bpm, _dir) = create_bpm(2, 2);

        let _h = bpm.pin_page(PageId::new(1)).unwrap();
        assert!(matches!(
            bpm.shutdown(),
            Err(ArborError::PoolBusy { pinned: 1 })
        ));
        assert!(bpm.is_open());

        bpm.unpin_page(PageId::new(1)).unwrap();
        bpm.shutdown().unwrap();
        assert!(!bpm.is_open());
        assert!(bpm.frame_contents().is_empty());
        assert!(matches!(
            bpm.pin_page(PageId::new(0)),
            Err(ArborError::InvalidArgument(_))
        ));
    }
}
