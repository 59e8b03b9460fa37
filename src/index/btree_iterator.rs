use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::BTreeNodeRef;

/// Forward cursor over the leaf chain of a [`super::BTreeIndex`].
///
/// The iterator's whole state is a (leaf page id, offset) pair; every read
/// fetches and unpins its leaf through the buffer pool, so the cursor holds
/// no pins between calls. The shared `Arc` keeps the pool alive for as long
/// as any cursor exists.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    offset: usize,
}

impl BTreeIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, offset: usize) -> Self {
        Self {
            bpm,
            page_id,
            offset,
        }
    }

    /// True once the cursor has run off the last leaf.
    pub fn is_end(&self) -> bool {
        self.page_id == INVALID_PAGE_ID
    }

    /// Reads the entry under the cursor.
    pub fn entry(&self) -> Result<(u32, RecordId)> {
        assert!(!self.is_end(), "reading an exhausted iterator");

        let guard = self.bpm.read_page(self.page_id)?;
        let node = BTreeNodeRef::new(guard.data());
        Ok((node.key_at(self.offset), node.rid_at(self.offset)))
    }

    /// Steps to the next entry, following the leaf chain off the end of
    /// the current page.
    pub fn advance(&mut self) -> Result<()> {
        assert!(!self.is_end(), "advancing an exhausted iterator");

        self.offset += 1;
        let guard = self.bpm.read_page(self.page_id)?;
        let node = BTreeNodeRef::new(guard.data());
        if self.offset >= node.size() {
            self.page_id = node.next_page_id().unwrap_or(INVALID_PAGE_ID);
            self.offset = 0;
        }
        Ok(())
    }
}

impl PartialEq for BTreeIterator {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.offset == other.offset
    }
}

impl Eq for BTreeIterator {}

impl Iterator for BTreeIterator {
    type Item = Result<(u32, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }

        let entry = self.entry();
        if entry.is_ok() {
            if let Err(e) = self.advance() {
                return Some(Err(e));
            }
        }
        Some(entry)
    }
}
