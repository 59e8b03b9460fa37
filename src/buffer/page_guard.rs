use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::{BufferPoolManager, FrameHeader};

/// RAII guard for read-only access to a pinned page.
///
/// Creating the guard pins the page (via `BufferPoolManager::read_page`);
/// dropping it unpins. The guard holds the frame's data lock for its whole
/// lifetime, so the borrowed bytes stay stable even while other threads
/// fetch the same page.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    /// Keeps the frame alive for the transmuted data guard below
    _frame: Arc<FrameHeader>,
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> ReadPageGuard<'a> {
    /// # Safety
    /// The data guard is transmuted to `'static`; the `Arc` field keeps the
    /// frame it borrows from alive, and `drop` releases the guard first.
    pub(crate) unsafe fn new(
        bpm: &'a BufferPoolManager,
        page_id: PageId,
        frame: Arc<FrameHeader>,
    ) -> Self {
        let data = frame.read_data();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            bpm,
            page_id,
            _frame: frame,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Release the data lock before unpinning: the unpin may flush this
        // very frame, which re-acquires the lock.
        self.data.take();
        if let Err(e) = self.bpm.unpin_page(self.page_id, false) {
            log::error!("unpin of {} failed: {}", self.page_id, e);
        }
    }
}

/// RAII guard for exclusive access to a pinned page.
///
/// Mutable access through `data_mut` marks the guard dirty; dropping the
/// guard unpins the page and hands the dirty flag to the buffer pool.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl<'a> WritePageGuard<'a> {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        bpm: &'a BufferPoolManager,
        page_id: PageId,
        frame: Arc<FrameHeader>,
    ) -> Self {
        let data = frame.write_data();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            bpm,
            page_id,
            _frame: frame,
            data: Some(data),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    /// Mutable view of the page bytes. Marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.data.take();
        if let Err(e) = self.bpm.unpin_page(self.page_id, self.is_dirty) {
            log::error!("unpin of {} failed: {}", self.page_id, e);
        }
    }
}
