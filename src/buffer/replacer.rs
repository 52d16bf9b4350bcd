//! Page replacement policies for the buffer pool.

use crate::common::{FrameId, ReplacementPolicy, Timestamp};

/// Trait for page replacement algorithms.
///
/// The pool reports every page load and every hit; the replacer only learns
/// about pins through `set_evictable`.
pub trait Replacer: Send {
    /// Records that a page was read from disk into the given frame.
    fn record_load(&mut self, frame_id: FrameId);

    /// Records a pin of a page that was already resident in the frame.
    fn record_hit(&mut self, frame_id: FrameId);

    /// Marks a frame as evictable (pin count 0) or not.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Returns the frame that would be evicted next, without forgetting it.
    ///
    /// Returns None if no frames are evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Forgets a frame entirely.
    fn remove(&mut self, frame_id: FrameId);

    /// Selects and forgets a victim frame.
    fn evict(&mut self) -> Option<FrameId> {
        let frame_id = self.victim()?;
        self.remove(frame_id);
        Some(frame_id)
    }

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;

    fn policy(&self) -> ReplacementPolicy;
}

/// Builds the replacer for a pool of `num_frames` frames.
pub fn make_replacer(policy: ReplacementPolicy, num_frames: usize) -> Box<dyn Replacer> {
    match policy {
        ReplacementPolicy::Fifo => Box::new(FifoReplacer::new(num_frames)),
        ReplacementPolicy::Lru => Box::new(LruReplacer::new(num_frames)),
    }
}

/// Per-frame stamps plus evictability. A frame with no stamp holds no page.
struct StampTable {
    stamps: Vec<Option<Timestamp>>,
    evictable: Vec<bool>,
    num_evictable: usize,
}

impl StampTable {
    fn new(num_frames: usize) -> Self {
        Self {
            stamps: vec![None; num_frames],
            evictable: vec![false; num_frames],
            num_evictable: 0,
        }
    }

    fn len(&self) -> usize {
        self.stamps.len()
    }

    fn stamp(&mut self, frame_id: FrameId, timestamp: Timestamp) {
        if let Some(slot) = self.stamps.get_mut(frame_id.as_usize()) {
            *slot = Some(timestamp);
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let idx = frame_id.as_usize();
        if idx >= self.evictable.len() || self.stamps[idx].is_none() {
            return;
        }
        if self.evictable[idx] != evictable {
            if evictable {
                self.num_evictable += 1;
            } else {
                self.num_evictable -= 1;
            }
            self.evictable[idx] = evictable;
        }
    }

    /// The evictable frame with the smallest stamp; ties go to the lowest
    /// frame index.
    fn oldest(&self) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }

        let mut victim: Option<(usize, Timestamp)> = None;
        for (idx, stamp) in self.stamps.iter().enumerate() {
            if !self.evictable[idx] {
                continue;
            }
            if let Some(ts) = *stamp {
                match victim {
                    Some((_, best)) if best <= ts => {}
                    _ => victim = Some((idx, ts)),
                }
            }
        }

        victim.map(|(idx, _)| FrameId::new(idx as u32))
    }

    /// The first evictable frame met walking the frame array from `start`,
    /// wrapping around at the end.
    fn first_from(&self, start: usize) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }

        let len = self.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| self.evictable[idx])
            .map(|idx| FrameId::new(idx as u32))
    }

    fn remove(&mut self, frame_id: FrameId) {
        let idx = frame_id.as_usize();
        if idx >= self.stamps.len() {
            return;
        }
        if self.evictable[idx] {
            self.num_evictable -= 1;
            self.evictable[idx] = false;
        }
        self.stamps[idx] = None;
    }
}

/// First-in first-out replacement.
///
/// Frames are considered in the cyclic order they were filled. A cursor sits
/// one past the most recent arrival; the victim is the first unpinned frame
/// met walking forward from it, so a pinned frame is skipped without losing
/// its place in the cycle. Hits do not move the cursor.
pub struct FifoReplacer {
    table: StampTable,
    cursor: usize,
}

impl FifoReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            table: StampTable::new(num_frames),
            cursor: 0,
        }
    }

    fn advance_past(&mut self, frame_id: FrameId) {
        if self.table.len() > 0 {
            self.cursor = (frame_id.as_usize() + 1) % self.table.len();
        }
    }
}

impl Replacer for FifoReplacer {
    fn record_load(&mut self, frame_id: FrameId) {
        // The stamp only marks the frame resident; the cursor carries the order
        self.table.stamp(frame_id, 0);
        self.advance_past(frame_id);
    }

    fn record_hit(&mut self, _frame_id: FrameId) {}

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.table.set_evictable(frame_id, evictable);
    }

    fn victim(&self) -> Option<FrameId> {
        self.table.first_from(self.cursor)
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.table.remove(frame_id);
    }

    fn evict(&mut self) -> Option<FrameId> {
        let frame_id = self.victim()?;
        self.table.remove(frame_id);
        self.advance_past(frame_id);
        Some(frame_id)
    }

    fn size(&self) -> usize {
        self.table.num_evictable
    }

    fn policy(&self) -> ReplacementPolicy {
        ReplacementPolicy::Fifo
    }
}

/// Least-recently-used replacement.
///
/// Every pin, hit or load, stamps the frame with the next value of a logical
/// access clock. The victim is the unpinned frame with the oldest stamp.
pub struct LruReplacer {
    table: StampTable,
    clock: Timestamp,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            table: StampTable::new(num_frames),
            clock: 0,
        }
    }

    fn touch(&mut self, frame_id: FrameId) {
        self.table.stamp(frame_id, self.clock);
        self.clock += 1;
    }
}

impl Replacer for LruReplacer {
    fn record_load(&mut self, frame_id: FrameId) {
        self.touch(frame_id);
    }

    fn record_hit(&mut self, frame_id: FrameId) {
        self.touch(frame_id);
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.table.set_evictable(frame_id, evictable);
    }

    fn victim(&self) -> Option<FrameId> {
        self.table.oldest()
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.table.remove(frame_id);
    }

    fn size(&self) -> usize {
        self.table.num_evictable
    }

    fn policy(&self) -> ReplacementPolicy {
        ReplacementPolicy::Lru
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_all(replacer: &mut dyn Replacer, frames: &[u32]) {
        for &f in frames {
            replacer.record_load(FrameId::new(f));
            replacer.set_evictable(FrameId::new(f), true);
        }
    }

    #[test]
    fn test_evict_empty() {
        let mut fifo = FifoReplacer::new(4);
        let mut lru = LruReplacer::new(4);
        assert_eq!(fifo.evict(), None);
        assert_eq!(lru.evict(), None);
    }

    #[test]
    fn test_fifo_ignores_hits() {
        let mut replacer = FifoReplacer::new(3);
        load_all(&mut replacer, &[0, 1, 2]);

        replacer.record_hit(FrameId::new(0));

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_fifo_skips_pinned() {
        let mut replacer = FifoReplacer::new(3);
        load_all(&mut replacer, &[0, 1, 2]);
        replacer.set_evictable(FrameId::new(0), false);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));

        // Reloading frame 1 makes it the newest arrival
        replacer.record_load(FrameId::new(1));
        replacer.set_evictable(FrameId::new(1), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fifo_resumes_after_skipped_frame() {
        let mut replacer = FifoReplacer::new(3);
        load_all(&mut replacer, &[0, 1, 2]);
        replacer.set_evictable(FrameId::new(0), false);

        // Frame 0 is skipped, frame 1 is refilled and the cycle moves on
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        replacer.record_load(FrameId::new(1));
        replacer.set_evictable(FrameId::new(0), true);

        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_victim_does_not_forget() {
        let mut fifo = FifoReplacer::new(2);
        let mut lru = LruReplacer::new(2);
        load_all(&mut fifo, &[0, 1]);
        load_all(&mut lru, &[0, 1]);

        assert_eq!(fifo.victim(), Some(FrameId::new(0)));
        assert_eq!(fifo.victim(), Some(FrameId::new(0)));
        assert_eq!(fifo.size(), 2);
        assert_eq!(lru.victim(), Some(FrameId::new(0)));
        assert_eq!(lru.size(), 2);
    }

    #[test]
    fn test_lru_hit_refreshes() {
        let mut replacer = LruReplacer::new(3);
        load_all(&mut replacer, &[0, 1, 2]);

        replacer.record_hit(FrameId::new(0));

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_unknown_frame_not_evictable() {
        let mut replacer = LruReplacer::new(2);
        replacer.set_evictable(FrameId::new(1), true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_remove() {
        let mut replacer = LruReplacer::new(2);
        load_all(&mut replacer, &[0, 1]);
        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_make_replacer() {
        assert_eq!(
            make_replacer(ReplacementPolicy::Fifo, 4).policy(),
            ReplacementPolicy::Fifo
        );
        assert_eq!(
            make_replacer(ReplacementPolicy::Lru, 4).policy(),
            ReplacementPolicy::Lru
        );
    }
}
