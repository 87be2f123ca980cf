// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The backend persistence contract and the in-memory backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::StorageError;
use super::index::PageIndex;
use super::page::{Page, PageId};
use super::record::{Key, Record};

/// Narrow interface to the external store.
///
/// The resource manager needs exactly two operations: load every committed
/// record routed to a page, and atomically write a page back. `page_out`
/// upserts every record in the page and deletes backend rows that fall in
/// the page's key domain but are absent from the page; implementations use
/// one backend transaction per call. Backend failures are retriable by the
/// caller because commit is idempotent under version monotonicity.
pub trait PageIo: Send + Sync {
    /// Returns all committed records whose routing property matches the
    /// page id. A page nobody has written is empty, not an error.
    fn page_in(&self, page_id: &PageId) -> Result<Page, StorageError>;

    /// Atomically persists a page.
    fn page_out(&self, page: &Page) -> Result<(), StorageError>;
}

/// In-memory backend: an ordered row map standing in for the external
/// relational store. Used by tests and embedded deployments.
pub struct MemPageIo<IX: PageIndex> {
    index: Arc<IX>,
    rows: RwLock<BTreeMap<String, Record>>,
}

impl<IX: PageIndex> MemPageIo<IX> {
    pub fn new(index: Arc<IX>) -> Self {
        Self {
            index,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Raw committed row, bypassing page routing. Diagnostic aid.
    pub fn row(&self, key: &Key) -> Option<Record> {
        self.rows.read().get(key.as_str()).cloned()
    }

    /// Number of committed rows, tombstones included.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}

impl<IX: PageIndex> PageIo for MemPageIo<IX> {
    fn page_in(&self, page_id: &PageId) -> Result<Page, StorageError> {
        let (start, end) = self.index.page_range(page_id);
        let rows = self.rows.read();

        let mut records = BTreeMap::new();
        for (key, record) in rows.range((Bound::Included(start), Bound::Excluded(end))) {
            records.insert(Key::from(key.as_str()), record.clone());
        }
        Ok(Page::with_records(page_id.clone(), records))
    }

    fn page_out(&self, page: &Page) -> Result<(), StorageError> {
        let (start, end) = self.index.page_range(page.id());
        let mut rows = self.rows.write();

        // One write lock spans the delete-and-upsert, standing in for the
        // backend transaction.
        let stale: Vec<String> = rows
            .range((Bound::Included(start), Bound::Excluded(end)))
            .filter(|(key, _)| !page.contains(&Key::from(key.as_str())))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            rows.remove(&key);
        }
        for (key, record) in page.iter() {
            rows.insert(key.as_str().to_string(), record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::PrefixOrderedIndex;
    use crate::storage::record::fields;

    fn io() -> (Arc<PrefixOrderedIndex>, MemPageIo<PrefixOrderedIndex>) {
        let index = Arc::new(PrefixOrderedIndex::new(4, 10));
        let io = MemPageIo::new(index.clone());
        (index, io)
    }

    #[test]
    fn test_unwritten_page_is_empty() {
        let (_, io) = io();
        let page = io.page_in(&PageId::from("001")).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_page_roundtrip() {
        let (index, io) = io();
        let key = index.normalize("0017").unwrap();
        let page_id = index.page_of(&key);

        let mut page = Page::new(page_id.clone());
        page.put(key.clone(), Record::new(fields([("price", 300)]), 1));
        io.page_out(&page).unwrap();

        let loaded = io.page_in(&page_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&key).unwrap().int_field("price"), Some(300));
    }

    #[test]
    fn test_page_out_deletes_absent_keys_in_domain() {
        let (index, io) = io();
        let a = index.normalize("0010").unwrap();
        let b = index.normalize("0011").unwrap();
        let page_id = index.page_of(&a);
        assert_eq!(page_id, index.page_of(&b));

        let mut page = Page::new(page_id.clone());
        page.put(a.clone(), Record::new(fields([("n", 1)]), 1));
        page.put(b.clone(), Record::new(fields([("n", 2)]), 1));
        io.page_out(&page).unwrap();

        // Rewrite the page without `b`: the backend row must go away.
        let mut page = Page::new(page_id.clone());
        page.put(a.clone(), Record::new(fields([("n", 1)]), 1));
        io.page_out(&page).unwrap();

        let loaded = io.page_in(&page_id).unwrap();
        assert!(loaded.contains(&a));
        assert!(!loaded.contains(&b));
    }

    #[test]
    fn test_page_out_leaves_neighbors_alone() {
        let (index, io) = io();
        let near = index.normalize("0017").unwrap();
        let far = index.normalize("0027").unwrap();

        let mut page = Page::new(index.page_of(&far));
        page.put(far.clone(), Record::new(fields([("n", 2)]), 1));
        io.page_out(&page).unwrap();

        // Writing an empty page for `near`'s domain must not touch `far`.
        io.page_out(&Page::new(index.page_of(&near))).unwrap();
        assert!(io.row(&far).is_some());
    }

    #[test]
    fn test_tombstones_are_rows() {
        let (index, io) = io();
        let key = index.normalize("0017").unwrap();
        let page_id = index.page_of(&key);

        let mut page = Page::new(page_id.clone());
        page.put(key.clone(), Record::tombstone(3));
        io.page_out(&page).unwrap();

        let loaded = io.page_in(&page_id).unwrap();
        let rec = loaded.get(&key).unwrap();
        assert!(rec.deleted);
        assert_eq!(rec.version, 3);
    }
}
