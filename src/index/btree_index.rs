use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_page::{
    BTreeNode, BTreeNodeRef, INTERNAL_SLOT_CAPACITY, LEAF_SLOT_CAPACITY,
};
use super::BTreeIterator;

/// Minimum entry count of a non-root node with the given overflow threshold
fn min_occupancy(max_size: usize) -> usize {
    (max_size + 1) / 2
}

/// A disk-resident B+Tree index mapping u32 keys to record ids.
///
/// Every page the tree touches goes through the buffer pool; pages refer to
/// each other by page id only. The tree's root page id is persisted in the
/// header page (page 0) under the index name, and re-resolved from there
/// when an index is reopened.
///
/// A single tree-wide latch (the mutex around the root page id, held for
/// the whole call) serializes insert, remove, and point lookups with each
/// other. Iterators take no tree latch; they rely on buffer pool pinning
/// for page stability.
pub struct BTreeIndex {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: Mutex<PageId>,
}

impl BTreeIndex {
    /// Opens the index named `name`, creating it lazily on first insert.
    ///
    /// The header page must already exist; on a fresh database the caller
    /// allocates it with the pool's first `new_page()`.
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(leaf_max_size >= 2, "leaf max size too small");
        assert!(internal_max_size >= 3, "internal max size too small");
        assert!(leaf_max_size <= LEAF_SLOT_CAPACITY, "leaf max size exceeds page capacity");
        // Internal pages hold one entry past the threshold mid-split
        assert!(
            internal_max_size < INTERNAL_SLOT_CAPACITY,
            "internal max size exceeds page capacity"
        );

        let root = {
            let guard = bpm.read_page(HEADER_PAGE_ID)?;
            let header = HeaderPageRef::new(guard.data());
            header.get_root_id(name).unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name: name.to_string(),
            bpm,
            leaf_max_size,
            internal_max_size,
            root_page_id: Mutex::new(root),
        })
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.lock() == INVALID_PAGE_ID
    }

    /// Point lookup: returns the record ids stored under `key` (zero or
    /// one, since keys are unique).
    pub fn get_value(&self, key: u32) -> Result<Vec<RecordId>> {
        let root = self.root_page_id.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }

        let leaf_page_id = self.find_leaf(*root, key)?;
        let guard = self.bpm.read_page(leaf_page_id)?;
        let node = BTreeNodeRef::new(guard.data());

        let pos = node.lower_bound(key);
        if pos < node.size() && node.key_at(pos) == key {
            Ok(vec![node.rid_at(pos)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Inserts `(key, rid)`. Returns Ok(false) if the key already exists;
    /// the tree is left untouched in that case.
    pub fn insert(&self, key: u32, rid: RecordId) -> Result<bool> {
        let mut root = self.root_page_id.lock();

        if *root == INVALID_PAGE_ID {
            let page_id = self.bpm.new_page()?;
            {
                let mut guard = self.bpm.write_page(page_id)?;
                let mut node = BTreeNode::new(guard.data_mut());
                node.init_leaf(page_id, None, self.leaf_max_size);
                node.insert_leaf_at(0, key, rid);
            }
            self.bpm.unpin_page(page_id, true)?;

            *root = page_id;
            self.set_root_record(page_id)?;
            log::debug!("index {} rooted at {}", self.index_name, page_id);
            return Ok(true);
        }

        let leaf_page_id = self.find_leaf(*root, key)?;
        let (inserted, overflow) = {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            let pos = node.lower_bound(key);
            if pos < node.size() && node.key_at(pos) == key {
                (false, false)
            } else {
                node.insert_leaf_at(pos, key, rid);
                (true, node.size() == self.leaf_max_size)
            }
        };

        if overflow {
            self.split_leaf(&mut root, leaf_page_id)?;
        }
        Ok(inserted)
    }

    /// Removes `key` if present. Underflowing nodes are refilled by merging
    /// with or borrowing from a sibling; the root is allowed to underflow
    /// and collapses away when it empties out.
    pub fn remove(&self, key: u32) -> Result<()> {
        let mut root = self.root_page_id.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(());
        }

        let leaf_page_id = self.find_leaf(*root, key)?;
        let removed = {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            let pos = node.lower_bound(key);
            if pos < node.size() && node.key_at(pos) == key {
                node.remove_leaf_at(pos);
                true
            } else {
                false
            }
        };

        if removed {
            self.rebalance(&mut root, leaf_page_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the first entry of the index.
    pub fn begin(&self) -> Result<BTreeIterator> {
        let root = *self.root_page_id.lock();
        if root == INVALID_PAGE_ID {
            return Ok(self.end());
        }

        let mut page_id = root;
        loop {
            let guard = self.bpm.read_page(page_id)?;
            let node = BTreeNodeRef::new(guard.data());
            if node.is_leaf() {
                return Ok(BTreeIterator::new(Arc::clone(&self.bpm), page_id, 0));
            }
            let next = node.child_at(0);
            drop(guard);
            page_id = next;
        }
    }

    /// Iterator positioned at the first entry whose key is >= `key`.
    pub fn begin_at(&self, key: u32) -> Result<BTreeIterator> {
        let root = *self.root_page_id.lock();
        if root == INVALID_PAGE_ID {
            return Ok(self.end());
        }

        let leaf_page_id = self.find_leaf(root, key)?;
        let guard = self.bpm.read_page(leaf_page_id)?;
        let node = BTreeNodeRef::new(guard.data());

        let pos = node.lower_bound(key);
        if pos < node.size() {
            Ok(BTreeIterator::new(Arc::clone(&self.bpm), leaf_page_id, pos))
        } else {
            // Key lands past this leaf's last entry: start at the next leaf
            match node.next_page_id() {
                Some(next) => Ok(BTreeIterator::new(Arc::clone(&self.bpm), next, 0)),
                None => Ok(self.end()),
            }
        }
    }

    /// The exhausted iterator.
    pub fn end(&self) -> BTreeIterator {
        BTreeIterator::new(Arc::clone(&self.bpm), INVALID_PAGE_ID, 0)
    }

    /// Walks from `root` down to the leaf that owns `key`, unpinning each
    /// internal page as the descent moves past it.
    fn find_leaf(&self, root: PageId, key: u32) -> Result<PageId> {
        let mut page_id = root;
        loop {
            let guard = self.bpm.read_page(page_id)?;
            let node = BTreeNodeRef::new(guard.data());
            if node.is_leaf() {
                return Ok(page_id);
            }
            let next = node.child_at(node.child_index(key));
            drop(guard);
            page_id = next;
        }
    }

    /// Splits the overflowing leaf: the upper half moves into a fresh right
    /// sibling, the chain is respliced, and the new leaf's first key rises
    /// into the parent.
    fn split_leaf(&self, root: &mut PageId, leaf_page_id: PageId) -> Result<()> {
        let (parent, old_next, moved) = {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            let parent = node.parent_page_id();
            let old_next = node.next_page_id();
            let moved = node.split_leaf();
            (parent, old_next, moved)
        };
        let separator = moved[0].0;

        let new_page_id = self.bpm.new_page()?;
        {
            let mut guard = self.bpm.write_page(new_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            node.init_leaf(new_page_id, parent, self.leaf_max_size);
            node.write_leaf_entries(&moved);
            node.set_next_page_id(old_next);
        }
        self.bpm.unpin_page(new_page_id, true)?;

        {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            BTreeNode::new(guard.data_mut()).set_next_page_id(Some(new_page_id));
        }

        self.insert_in_parent(root, leaf_page_id, separator, new_page_id)
    }

    /// Hangs `right` next to `left` under their parent, growing a new root
    /// when `left` was the root and splitting the parent when it overflows.
    fn insert_in_parent(
        &self,
        root: &mut PageId,
        left: PageId,
        separator: u32,
        right: PageId,
    ) -> Result<()> {
        let parent = {
            let guard = self.bpm.read_page(left)?;
            BTreeNodeRef::new(guard.data()).parent_page_id()
        };

        let Some(parent_page_id) = parent else {
            // `left` was the root: grow the tree by one level
            let new_root = self.bpm.new_page()?;
            {
                let mut guard = self.bpm.write_page(new_root)?;
                let mut node = BTreeNode::new(guard.data_mut());
                node.init_internal(new_root, None, self.internal_max_size);
                node.write_internal_entries(&[(0, left), (separator, right)]);
            }
            self.bpm.unpin_page(new_root, true)?;

            for child in [left, right] {
                let mut guard = self.bpm.write_page(child)?;
                BTreeNode::new(guard.data_mut()).set_parent_page_id(Some(new_root));
            }

            *root = new_root;
            self.set_root_record(new_root)?;
            log::debug!("index {} grew a new root {}", self.index_name, new_root);
            return Ok(());
        };

        let overflow = {
            let mut guard = self.bpm.write_page(parent_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            node.insert_internal_entry(separator, right);
            node.size() > self.internal_max_size
        };

        if overflow {
            self.split_internal(root, parent_page_id)?;
        }
        Ok(())
    }

    /// Splits an overflowing internal page at the ceiling midpoint; the
    /// middle key is promoted into the parent rather than copied right.
    fn split_internal(&self, root: &mut PageId, page_id: PageId) -> Result<()> {
        let (parent, promoted, moved) = {
            let mut guard = self.bpm.write_page(page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            let parent = node.parent_page_id();
            let (promoted, moved) = node.split_internal();
            (parent, promoted, moved)
        };

        let new_page_id = self.bpm.new_page()?;
        {
            let mut guard = self.bpm.write_page(new_page_id)?;
            let mut node = BTreeNode::new(guard.data_mut());
            node.init_internal(new_page_id, parent, self.internal_max_size);
            node.write_internal_entries(&moved);
        }
        self.bpm.unpin_page(new_page_id, true)?;

        for &(_, child) in &moved {
            let mut guard = self.bpm.write_page(child)?;
            BTreeNode::new(guard.data_mut()).set_parent_page_id(Some(new_page_id));
        }

        self.insert_in_parent(root, page_id, promoted, new_page_id)
    }

    /// Restores the occupancy invariant of `page_id` after a deletion,
    /// recursing up the tree as separators disappear from parents.
    fn rebalance(&self, root: &mut PageId, page_id: PageId) -> Result<()> {
        let (is_leaf, size, parent) = {
            let guard = self.bpm.read_page(page_id)?;
            let node = BTreeNodeRef::new(guard.data());
            (node.is_leaf(), node.size(), node.parent_page_id())
        };

        let Some(parent_page_id) = parent else {
            // The root may underflow freely; it only changes when a leaf
            // root empties out or an internal root is down to one child.
            if is_leaf {
                if size == 0 {
                    self.bpm.delete_page(page_id)?;
                    *root = INVALID_PAGE_ID;
                    self.set_root_record(INVALID_PAGE_ID)?;
                    log::debug!("index {} is now empty", self.index_name);
                }
            } else if size == 1 {
                let child = {
                    let guard = self.bpm.read_page(page_id)?;
                    BTreeNodeRef::new(guard.data()).child_at(0)
                };
                {
                    let mut guard = self.bpm.write_page(child)?;
                    BTreeNode::new(guard.data_mut()).set_parent_page_id(None);
                }
                self.bpm.delete_page(page_id)?;
                *root = child;
                self.set_root_record(child)?;
                log::debug!("index {} root collapsed into {}", self.index_name, child);
            }
            return Ok(());
        };

        let max_size = if is_leaf { self.leaf_max_size } else { self.internal_max_size };
        if size >= min_occupancy(max_size) {
            return Ok(());
        }

        // Choose a sibling through the parent: the rightmost child borrows
        // left, everyone else borrows right. sep_index names the separator
        // between the pair, which is also the right node's slot in the
        // parent.
        let (left, right, sep_index) = {
            let guard = self.bpm.read_page(parent_page_id)?;
            let node = BTreeNodeRef::new(guard.data());
            let idx = node
                .index_of_child(page_id)
                .expect("node missing from its parent");
            if idx == node.size() - 1 {
                (node.child_at(idx - 1), page_id, idx)
            } else {
                (page_id, node.child_at(idx + 1), idx + 1)
            }
        };

        let (left_size, right_size) = {
            let left_guard = self.bpm.read_page(left)?;
            let right_guard = self.bpm.read_page(right)?;
            (
                BTreeNodeRef::new(left_guard.data()).size(),
                BTreeNodeRef::new(right_guard.data()).size(),
            )
        };

        if left_size + right_size <= max_size {
            self.merge(root, left, right, parent_page_id, sep_index, is_leaf)
        } else {
            self.redistribute(page_id, left, right, parent_page_id, sep_index, is_leaf)
        }
    }

    /// Folds `right` into `left`, drops the separator from the parent, and
    /// rebalances the parent in turn.
    fn merge(
        &self,
        root: &mut PageId,
        left: PageId,
        right: PageId,
        parent_page_id: PageId,
        sep_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        if is_leaf {
            let (entries, right_next) = {
                let guard = self.bpm.read_page(right)?;
                let node = BTreeNodeRef::new(guard.data());
                (node.leaf_entries(), node.next_page_id())
            };
            let mut guard = self.bpm.write_page(left)?;
            let mut node = BTreeNode::new(guard.data_mut());
            for (key, rid) in entries {
                let size = node.size();
                node.insert_leaf_at(size, key, rid);
            }
            node.set_next_page_id(right_next);
        } else {
            // The separator comes down to key the right node's first child
            let separator = {
                let guard = self.bpm.read_page(parent_page_id)?;
                BTreeNodeRef::new(guard.data()).key_at(sep_index)
            };
            let entries = {
                let guard = self.bpm.read_page(right)?;
                BTreeNodeRef::new(guard.data()).internal_entries()
            };
            {
                let mut guard = self.bpm.write_page(left)?;
                let mut node = BTreeNode::new(guard.data_mut());
                for (i, &(key, child)) in entries.iter().enumerate() {
                    let size = node.size();
                    let key = if i == 0 { separator } else { key };
                    node.insert_internal_at(size, key, child);
                }
            }
            for &(_, child) in &entries {
                let mut guard = self.bpm.write_page(child)?;
                BTreeNode::new(guard.data_mut()).set_parent_page_id(Some(left));
            }
        }

        self.bpm.delete_page(right)?;

        {
            let mut guard = self.bpm.write_page(parent_page_id)?;
            BTreeNode::new(guard.data_mut()).remove_internal_at(sep_index);
        }
        self.rebalance(root, parent_page_id)
    }

    /// Borrows one entry from the richer sibling into the underflowing
    /// node and fixes the separator between them.
    fn redistribute(
        &self,
        page_id: PageId,
        left: PageId,
        right: PageId,
        parent_page_id: PageId,
        sep_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        let new_separator;

        if is_leaf {
            if page_id == left {
                // Pull the right sibling's first entry
                let (key, rid, next_key) = {
                    let mut guard = self.bpm.write_page(right)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    let (key, rid) = node.remove_leaf_at(0);
                    (key, rid, node.key_at(0))
                };
                let mut guard = self.bpm.write_page(left)?;
                let mut node = BTreeNode::new(guard.data_mut());
                let size = node.size();
                node.insert_leaf_at(size, key, rid);
                new_separator = next_key;
            } else {
                // Pull the left sibling's last entry
                let (key, rid) = {
                    let mut guard = self.bpm.write_page(left)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    let last = node.size() - 1;
                    node.remove_leaf_at(last)
                };
                let mut guard = self.bpm.write_page(right)?;
                BTreeNode::new(guard.data_mut()).insert_leaf_at(0, key, rid);
                new_separator = key;
            }
        } else {
            let separator = {
                let guard = self.bpm.read_page(parent_page_id)?;
                BTreeNodeRef::new(guard.data()).key_at(sep_index)
            };

            let moved_child;
            if page_id == left {
                // Right's first child migrates left through the separator
                let first_key;
                {
                    let mut guard = self.bpm.write_page(right)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    moved_child = node.child_at(0);
                    first_key = node.key_at(1);
                    node.remove_internal_at(0);
                }
                {
                    let mut guard = self.bpm.write_page(left)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    let size = node.size();
                    node.insert_internal_at(size, separator, moved_child);
                }
                new_separator = first_key;
            } else {
                // Left's last child migrates right through the separator
                let last_key;
                {
                    let mut guard = self.bpm.write_page(left)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    let last = node.size() - 1;
                    last_key = node.key_at(last);
                    moved_child = node.child_at(last);
                    node.set_size(last);
                }
                {
                    let mut guard = self.bpm.write_page(right)?;
                    let mut node = BTreeNode::new(guard.data_mut());
                    node.insert_internal_at(0, 0, moved_child);
                    node.set_key_at(1, separator);
                }
                new_separator = last_key;
            }

            let mut guard = self.bpm.write_page(moved_child)?;
            BTreeNode::new(guard.data_mut()).set_parent_page_id(Some(page_id));
        }

        let mut guard = self.bpm.write_page(parent_page_id)?;
        BTreeNode::new(guard.data_mut()).set_key_at(sep_index, new_separator);
        Ok(())
    }

    /// Records the current root page id in the header page. Every root
    /// change must come through here so a reopened index finds its tree.
    fn set_root_record(&self, root: PageId) -> Result<()> {
        let mut guard = self.bpm.write_page(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if header.has_record(&self.index_name) {
            header.update_record(&self.index_name, root);
        } else {
            header.insert_record(&self.index_name, root)?;
        }
        Ok(())
    }
}
