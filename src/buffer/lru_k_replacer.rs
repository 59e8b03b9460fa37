use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame
#[derive(Debug)]
struct FrameRecord {
    /// The last k access timestamps, oldest first
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl FrameRecord {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Backward k-distance at `now`, or None for frames with fewer than k
    /// recorded accesses (treated as infinite distance).
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }
}

#[derive(Debug)]
struct ReplacerState {
    records: HashMap<FrameId, FrameRecord>,
    /// Count of records with is_evictable set
    num_evictable: usize,
    /// Logical clock, ticked on every recorded access
    current_timestamp: Timestamp,
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame with the largest backward k-distance:
/// the age of its k-th most recent access. A frame with fewer than k
/// recorded accesses has infinite distance and outranks every frame with a
/// full history; ties between such frames go to the one whose *first*
/// access is oldest.
pub struct LruKReplacer {
    k: usize,
    /// Frames are identified by indices in `0..num_frames`
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState {
                records: HashMap::new(),
                num_evictable: 0,
                current_timestamp: 0,
            }),
        }
    }

    /// Selects, removes, and returns the victim frame, or None when nothing
    /// is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.num_evictable == 0 {
            return None;
        }

        let now = state.current_timestamp;
        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_first_ts: Timestamp = Timestamp::MAX;

        for (&frame_id, record) in state.records.iter() {
            if !record.is_evictable {
                continue;
            }

            let k_dist = record.k_distance(now, self.k);
            let first_ts = record.history.front().copied().unwrap_or(Timestamp::MAX);

            let better = match (victim_k_dist, k_dist) {
                // Candidate has a full history but the current victim does
                // not: the victim's infinite distance wins.
                (None, Some(_)) => false,
                (Some(_), None) => true,
                (None, None) => first_ts < victim_first_ts,
                (Some(v), Some(c)) => c > v,
            };

            if victim.is_none() || better {
                victim = Some(frame_id);
                victim_k_dist = k_dist;
                victim_first_ts = first_ts;
            }
        }

        if let Some(frame_id) = victim {
            state.records.remove(&frame_id);
            state.num_evictable -= 1;
        }

        victim
    }

    /// Records an access to `frame_id` at the current logical time,
    /// creating a (non-evictable) record for the frame if it has none.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(frame_id.as_usize() < self.num_frames, "Invalid frame ID");

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;
        let k = self.k;

        let record = state.records.entry(frame_id).or_insert_with(FrameRecord::new);
        record.history.push_back(timestamp);
        while record.history.len() > k {
            record.history.pop_front();
        }
    }

    /// Moves a frame between the evictable and pinned sets. Untracked
    /// frames and no-op transitions are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        assert!(frame_id.as_usize() < self.num_frames, "Invalid frame ID");

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(record) = state.records.get_mut(&frame_id) {
            if record.is_evictable != evictable {
                record.is_evictable = evictable;
                if evictable {
                    state.num_evictable += 1;
                } else {
                    state.num_evictable -= 1;
                }
            }
        }
    }

    /// Drops a frame from tracking entirely, e.g. when its page is deleted.
    /// Removing a tracked frame that is not evictable is a caller bug.
    pub fn remove(&self, frame_id: FrameId) {
        assert!(frame_id.as_usize() < self.num_frames, "Invalid frame ID");

        let mut state = self.state.lock();
        if let Some(record) = state.records.remove(&frame_id) {
            assert!(record.is_evictable, "removing a pinned frame");
            state.num_evictable -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_ties_broken_by_first_access() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));

        for i in 0..3 {
            replacer.set_evictable(FrameId::new(i), true);
        }
        assert_eq!(replacer.size(), 3);

        // All three have a single access: infinite distance, FIFO order
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_partial_history_beats_full_history() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 has fewer than k accesses and loses to no one
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_largest_k_distance_wins() {
        let replacer = LruKReplacer::new(2, 10);

        for frame in 0..3u32 {
            replacer.record_access(FrameId::new(frame));
            replacer.record_access(FrameId::new(frame));
        }
        for frame in 0..3 {
            replacer.set_evictable(FrameId::new(frame), true);
        }

        // Oldest k-th access first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_history_bounded_to_k() {
        let replacer = LruKReplacer::new(2, 10);

        for _ in 0..10 {
            replacer.record_access(FrameId::new(0));
        }
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 0's k-th most recent access is still older than frame 1's
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_set_evictable_untracked_is_noop() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.set_evictable(FrameId::new(3), true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_remove_untracked_is_noop() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.remove(FrameId::new(5));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    #[should_panic(expected = "removing a pinned frame")]
    fn test_remove_pinned_frame_panics() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(0));
        replacer.remove(FrameId::new(0));
    }

    #[test]
    #[should_panic(expected = "Invalid frame ID")]
    fn test_out_of_range_frame_panics() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(10));
    }
}
