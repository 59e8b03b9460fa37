pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{BTreeNode, BTreeNodeRef};
