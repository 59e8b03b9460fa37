use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    FrameId, PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_TABLE_BUCKET_SIZE,
};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping mutated under the pool-wide latch
struct PoolState {
    /// Frames holding no page at all
    free_list: VecDeque<FrameId>,
    /// Monotone page-id allocator; ids are never reused
    next_page_id: u32,
}

/// BufferPoolManager mediates between callers and the disk: it owns a fixed
/// set of frames, caches pages in them, and evicts with an LRU-K policy
/// when every frame is occupied.
///
/// At any instant each frame is either on the free list or mapped by the
/// page table, never both. A single pool-wide latch serializes the public
/// operations; disk I/O happens under it. Pin counts guard the frames'
/// bytes: callers may only touch a page between a successful fetch and the
/// matching unpin, which the page guards automate.
pub struct BufferPoolManager {
    /// Number of frames in the pool
    pool_size: usize,
    /// The frames themselves, indexed by frame id
    frames: Vec<Arc<FrameHeader>>,
    /// Maps resident page ids to the frames that hold them
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Eviction policy
    replacer: LruKReplacer,
    /// Pool-wide latch over free list and page-id allocation
    state: Mutex<PoolState>,
    /// Disk traffic goes through the scheduler's worker thread
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager,
    /// using LRU-`replacer_k` replacement.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(pool_size > 0, "pool size must be positive");

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(replacer_k, pool_size),
            state: Mutex::new(PoolState {
                free_list,
                next_page_id: 0,
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page id, binds it to a frame, and pins it once.
    /// The frame is zeroed and the blank page is written out immediately,
    /// so the id is readable from disk from this point on.
    ///
    /// Fails with `BufferPoolFull` only if every frame is pinned.
    pub fn new_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        {
            let data = frame.read_data();
            self.disk_scheduler.schedule_write_sync(page_id, &data[..])?;
        }

        Ok(page_id)
    }

    /// Pins `page_id` and returns its frame, reading it from disk first if
    /// it is not resident. Fails with `BufferPoolFull` only if the page is
    /// absent and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        assert_ne!(page_id, INVALID_PAGE_ID, "Invalid page ID");

        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.as_usize()];

        {
            let mut data = frame.write_data();
            self.disk_scheduler.schedule_read_sync(page_id, &mut data[..])?;
        }
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Fetches a page for shared access; the guard unpins on drop.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(unsafe { ReadPageGuard::new(self, page_id, frame) })
    }

    /// Fetches a page for exclusive access; the guard unpins on drop and
    /// carries the dirty flag back to the pool.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(unsafe { WritePageGuard::new(self, page_id, frame) })
    }

    /// Drops one pin from `page_id`, ORing in the caller's dirty flag.
    /// When the count reaches zero the frame becomes evictable, and a dirty
    /// frame is flushed (and marked clean) on the way.
    ///
    /// Returns Ok(false) if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let _state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return Ok(false);
        }

        if is_dirty {
            frame.set_dirty(true);
        }

        if frame.unpin() == Some(0) {
            self.replacer.set_evictable(frame_id, true);
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk_scheduler.schedule_write_sync(page_id, &data[..])?;
                drop(data);
                frame.set_dirty(false);
            }
        }

        Ok(true)
    }

    /// Writes `page_id` out unconditionally and clears its dirty flag.
    /// Returns Ok(false) if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        assert_ne!(page_id, INVALID_PAGE_ID, "Invalid page ID");

        let _state = self.state.lock();
        self.flush_locked(page_id)
    }

    /// Flushes every resident page. The allocation counter bounds the walk:
    /// every resident page id is below it.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();

        for id in 0..state.next_page_id {
            self.flush_locked(PageId::new(id))?;
        }
        Ok(())
    }

    fn flush_locked(&self, page_id: PageId) -> Result<bool> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.as_usize()];

        {
            let data = frame.read_data();
            self.disk_scheduler.schedule_write_sync(page_id, &data[..])?;
        }
        frame.set_dirty(false);

        Ok(true)
    }

    /// Evicts `page_id` from the pool and retires its id.
    ///
    /// A pinned page is refused (Ok(false)); a page that is not resident is
    /// trivially deleted (Ok(true)). The page id is never handed out again:
    /// allocation is a monotone counter.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        self.replacer.remove(frame_id);
        self.page_table.remove(&page_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        Ok(true)
    }

    /// Finds a frame for a new occupant: the free list first, otherwise an
    /// eviction victim. A dirty victim is written out before its frame is
    /// handed over.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Err(StrataError::BufferPoolFull);
        };

        let frame = &self.frames[frame_id.as_usize()];
        let victim_page_id = frame.page_id();

        if frame.is_dirty() {
            log::trace!("evicting dirty page {}", victim_page_id);
            let data = frame.read_data();
            self.disk_scheduler
                .schedule_write_sync(victim_page_id, &data[..])?;
        }

        self.page_table.remove(&victim_page_id);
        frame.reset();

        Ok(frame_id)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _state = self.state.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of frames currently holding no page
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }
}
