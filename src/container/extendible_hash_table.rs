use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

/// Hasher backing the directory index function.
///
/// Integer keys hash to their own value, so a key's directory slot is just
/// its low `global_depth` bits. Composite keys fold their bytes in
/// little-endian order.
#[derive(Default)]
struct DirectoryHasher {
    state: u64,
}

impl Hasher for DirectoryHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate().take(8) {
            self.state |= (*b as u64) << (8 * i);
        }
    }

    fn write_u8(&mut self, i: u8) {
        self.state = i as u64;
    }

    fn write_u16(&mut self, i: u16) {
        self.state = i as u64;
    }

    fn write_u32(&mut self, i: u32) {
        self.state = i as u64;
    }

    fn write_u64(&mut self, i: u64) {
        self.state = i;
    }

    fn write_usize(&mut self, i: usize) {
        self.state = i as u64;
    }

    fn write_i32(&mut self, i: i32) {
        self.state = i as u32 as u64;
    }

    fn write_i64(&mut self, i: i64) {
        self.state = i as u64;
    }
}

/// A bucket holds at most `capacity` entries plus its local depth: the
/// number of hash bits that are identical across every key stored in it.
struct Bucket<K, V> {
    items: Vec<(K, V)>,
    depth: u32,
    capacity: usize,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(capacity: usize, depth: u32) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            depth,
            capacity,
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

type BucketRef<K, V> = Arc<RwLock<Bucket<K, V>>>;

/// Directory + bucket state, guarded as a unit by the table latch.
struct Directory<K, V> {
    /// 2^global_depth slots; several slots may alias one bucket when its
    /// local depth is smaller than the global depth.
    slots: Vec<BucketRef<K, V>>,
    global_depth: u32,
    num_buckets: usize,
}

/// A concurrent extendible hash table.
///
/// The directory is indexed by the low `global_depth` bits of the key hash.
/// Inserting into a full bucket splits it: the directory doubles first if
/// the bucket already uses every directory bit, then the bucket's entries
/// are redistributed over one more bit. Buckets are never merged.
///
/// Lookups and depth accessors take the table latch shared; insert and
/// remove take it exclusively for the whole operation, so directory and
/// bucket invariants always hold at the latch boundary.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: RwLock<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single empty bucket and global depth 0.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            bucket_size,
            dir: RwLock::new(Directory {
                slots: vec![Arc::new(RwLock::new(Bucket::new(bucket_size, 0)))],
                global_depth: 0,
                num_buckets: 1,
            }),
        }
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = DirectoryHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn index_of(key: &K, global_depth: u32) -> usize {
        let mask = (1u64 << global_depth) - 1;
        (Self::hash_of(key) & mask) as usize
    }

    /// Looks up the value stored for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.read();
        let bucket = dir.slots[Self::index_of(key, dir.global_depth)].read();
        bucket.find(key).cloned()
    }

    /// Inserts a key/value pair, overwriting the value if the key exists.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.write();

        loop {
            let idx = Self::index_of(&key, dir.global_depth);
            let bucket_ref = Arc::clone(&dir.slots[idx]);
            let mut bucket = bucket_ref.write();

            if let Some(slot) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }

            if !bucket.is_full() {
                bucket.items.push((key, value));
                return;
            }

            // Full bucket: split it and try again. Each pass raises either
            // the bucket's local depth or the global depth, so this
            // terminates once the colliding keys spread over enough bits.
            let local_depth = bucket.depth;
            drop(bucket);
            self.split_bucket(&mut dir, idx, local_depth, &bucket_ref);
        }
    }

    fn split_bucket(
        &self,
        dir: &mut Directory<K, V>,
        idx: usize,
        local_depth: u32,
        old_bucket: &BucketRef<K, V>,
    ) {
        if local_depth == dir.global_depth {
            // Every directory bit is in use: double the directory. New slot
            // i aliases slot i - old_len, so each bucket is now referenced
            // from twice as many slots.
            let old_len = dir.slots.len();
            for i in 0..old_len {
                let alias = Arc::clone(&dir.slots[i]);
                dir.slots.push(alias);
            }
            dir.global_depth += 1;
            log::debug!("hash directory doubled to 2^{}", dir.global_depth);
        }

        let new_depth = local_depth + 1;
        let signature_mask = (1usize << new_depth) - 1;
        let new_signature = (idx & ((1 << local_depth) - 1)) | (1 << local_depth);

        let new_bucket = Arc::new(RwLock::new(Bucket::new(self.bucket_size, new_depth)));

        // Point every aliasing slot whose low new_depth bits match the new
        // signature at the new bucket.
        for i in 0..dir.slots.len() {
            if i & signature_mask == new_signature && Arc::ptr_eq(&dir.slots[i], old_bucket) {
                dir.slots[i] = Arc::clone(&new_bucket);
            }
        }

        // Redistribute entries over the extra bit.
        {
            let mut old = old_bucket.write();
            let mut new = new_bucket.write();
            old.depth = new_depth;
            let (stay, moved): (Vec<_>, Vec<_>) = old
                .items
                .drain(..)
                .partition(|(k, _)| (Self::hash_of(k) as usize) & signature_mask != new_signature);
            old.items = stay;
            new.items = moved;
        }

        dir.num_buckets += 1;
    }

    /// Removes the entry for `key`, returning whether it was present.
    /// Buckets are never merged and the directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let dir = self.dir.write();
        let bucket_ref = Arc::clone(&dir.slots[Self::index_of(key, dir.global_depth)]);
        let mut bucket = bucket_ref.write();
        bucket.remove(key)
    }

    /// Returns the global depth of the directory.
    pub fn get_global_depth(&self) -> u32 {
        self.dir.read().global_depth
    }

    /// Returns the local depth of the bucket referenced by directory slot
    /// `dir_index`.
    pub fn get_local_depth(&self, dir_index: usize) -> u32 {
        let dir = self.dir.read();
        let depth = dir.slots[dir_index].read().depth;
        depth
    }

    /// Returns the number of distinct buckets.
    pub fn get_num_buckets(&self) -> usize {
        self.dir.read().num_buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);
        assert_eq!(table.get_global_depth(), 0);
        assert_eq!(table.get_num_buckets(), 1);
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_insert_find() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1u32, "a");
        table.insert(2, "b");
        table.insert(3, "c");

        assert_eq!(table.find(&1), Some("a"));
        assert_eq!(table.find(&2), Some("b"));
        assert_eq!(table.find(&3), Some("c"));
        assert_eq!(table.find(&4), None);
    }

    #[test]
    fn test_insert_updates_existing_key() {
        let table = ExtendibleHashTable::new(2);
        table.insert(7u32, 1);
        table.insert(7, 2);
        assert_eq!(table.find(&7), Some(2));
        assert_eq!(table.get_num_buckets(), 1);
    }

    #[test]
    fn test_remove() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1u32, "a");
        table.insert(2, "b");

        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
        assert_eq!(table.find(&2), Some("b"));
    }

    #[test]
    fn test_directory_doubling() {
        let table = ExtendibleHashTable::new(2);

        // Keys 0 and 4 share their low two bits, forcing two splits
        table.insert(0u32, 0);
        table.insert(4, 4);
        table.insert(8, 8);

        assert!(table.get_global_depth() >= 2);
        assert_eq!(table.find(&0), Some(0));
        assert_eq!(table.find(&4), Some(4));
        assert_eq!(table.find(&8), Some(8));
    }

    #[test]
    fn test_local_depth_bounded_by_global_depth() {
        let table = ExtendibleHashTable::new(2);
        for i in 0..32u32 {
            table.insert(i, i);
        }

        let global = table.get_global_depth();
        for i in 0..(1usize << global) {
            assert!(table.get_local_depth(i) <= global);
        }
    }
}
