use crate::common::{PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of root records the header page can hold
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Byte view over the well-known header page (page 0).
///
/// The header page is a tiny record store mapping index names to their root
/// page ids. Each record is 36 bytes: a zero-padded 32-byte name followed by
/// the root page id. Indexes re-resolve their root through this page after a
/// restart, and must update their record on every root change.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        let bytes = (count as u32).to_le_bytes();
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4].copy_from_slice(&bytes);
    }

    /// Inserts a new (name, root page id) record.
    /// Returns Ok(false) if a record with this name already exists.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        assert!(name.len() <= NAME_SIZE, "index name too long");

        if self.find_record(name).is_some() {
            return Ok(false);
        }

        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS {
            return Err(StrataError::HeaderPageFull);
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_u32().to_le_bytes());
        self.set_record_count(count + 1);

        Ok(true)
    }

    /// Updates the root page id of an existing record.
    /// Returns false if no record with this name exists.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                let offset = RECORDS_OFFSET + index * RECORD_SIZE;
                self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
                    .copy_from_slice(&root_page_id.as_u32().to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Looks up the root page id recorded for the given index name.
    /// Returns None if the name has no record, or its record holds the
    /// invalid page id (an index that currently has no root).
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = self.find_record(name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        let root = PageId::new(u32::from_le_bytes(bytes));
        if root == INVALID_PAGE_ID {
            None
        } else {
            Some(root)
        }
    }

    /// Returns true if a record exists for the given name, whatever its root.
    pub fn has_record(&self, name: &str) -> bool {
        self.find_record(name).is_some()
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        find_record(self.data, name)
    }
}

/// Read-only byte view over the header page
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    /// See [`HeaderPage::get_root_id`].
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = find_record(self.data, name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        let root = PageId::new(u32::from_le_bytes(bytes));
        if root == INVALID_PAGE_ID {
            None
        } else {
            Some(root)
        }
    }

    pub fn has_record(&self, name: &str) -> bool {
        find_record(self.data, name).is_some()
    }
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    assert!(name.len() <= NAME_SIZE, "index name too long");
    let mut padded = [0u8; NAME_SIZE];
    padded[..name.len()].copy_from_slice(name.as_bytes());

    let count_bytes: [u8; 4] = data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
        .try_into()
        .unwrap();
    let count = u32::from_le_bytes(count_bytes) as usize;

    (0..count).find(|&i| {
        let offset = RECORDS_OFFSET + i * RECORD_SIZE;
        data[offset..offset + NAME_SIZE] == padded
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_page_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);

        assert!(header.insert_record("idx_a", PageId::new(7)).unwrap());
        assert!(header.insert_record("idx_b", PageId::new(9)).unwrap());
        assert_eq!(header.record_count(), 2);

        assert_eq!(header.get_root_id("idx_a"), Some(PageId::new(7)));
        assert_eq!(header.get_root_id("idx_b"), Some(PageId::new(9)));
        assert_eq!(header.get_root_id("idx_c"), None);
    }

    #[test]
    fn test_header_page_duplicate_insert() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);

        assert!(header.insert_record("idx", PageId::new(1)).unwrap());
        assert!(!header.insert_record("idx", PageId::new(2)).unwrap());
        assert_eq!(header.get_root_id("idx"), Some(PageId::new(1)));
    }

    #[test]
    fn test_header_page_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);

        assert!(!header.update_record("idx", PageId::new(5)));

        header.insert_record("idx", PageId::new(5)).unwrap();
        assert!(header.update_record("idx", PageId::new(11)));
        assert_eq!(header.get_root_id("idx"), Some(PageId::new(11)));
    }

    #[test]
    fn test_header_page_invalid_root_reads_as_none() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);

        header.insert_record("idx", PageId::new(3)).unwrap();
        assert!(header.update_record("idx", INVALID_PAGE_ID));

        assert_eq!(header.get_root_id("idx"), None);
        assert!(header.has_record("idx"));
    }

    #[test]
    fn test_header_page_full() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);

        for i in 0..MAX_HEADER_RECORDS {
            header
                .insert_record(&format!("idx_{}", i), PageId::new(i as u32))
                .unwrap();
        }

        assert!(matches!(
            header.insert_record("one_too_many", PageId::new(0)),
            Err(StrataError::HeaderPageFull)
        ));
    }
}
