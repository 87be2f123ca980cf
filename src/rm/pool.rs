// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory cache of committed pages.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::storage::{Key, Page, PageId, Record};

/// Cache of committed pages, loaded lazily on miss and written back at
/// commit. The cache owns its pages; transactions only ever see copies of
/// individual records. Pages may be evicted when not needed: a later
/// access reloads from the backend.
pub struct CommittedPagePool {
    pages: RwLock<HashMap<PageId, Page>>,
}

impl CommittedPagePool {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn contains(&self, page_id: &PageId) -> bool {
        self.pages.read().contains_key(page_id)
    }

    /// Copy of one committed record, if the page is cached and holds it.
    pub fn record(&self, page_id: &PageId, key: &Key) -> Option<Record> {
        self.pages.read().get(page_id)?.get(key).cloned()
    }

    /// Inserts or replaces a cached page.
    pub fn insert(&self, page: Page) {
        self.pages.write().insert(page.id().clone(), page);
    }

    /// Mutates a cached page in place. Returns a copy of the result, or
    /// `None` if the page is not cached.
    pub fn apply(&self, page_id: &PageId, f: impl FnOnce(&mut Page)) -> Option<Page> {
        let mut pages = self.pages.write();
        let page = pages.get_mut(page_id)?;
        f(page);
        Some(page.clone())
    }

    /// Drops a page from the cache.
    pub fn evict(&self, page_id: &PageId) {
        self.pages.write().remove(page_id);
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

impl Default for CommittedPagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fields;

    #[test]
    fn test_insert_and_lookup() {
        let pool = CommittedPagePool::new();
        let key = Key::from("0001");
        let mut page = Page::new(PageId::from("000"));
        page.put(key.clone(), Record::new(fields([("n", 1)]), 1));
        pool.insert(page);

        assert!(pool.contains(&PageId::from("000")));
        assert_eq!(
            pool.record(&PageId::from("000"), &key).unwrap().version,
            1
        );
        assert!(pool.record(&PageId::from("001"), &key).is_none());
    }

    #[test]
    fn test_apply_mutates_in_place() {
        let pool = CommittedPagePool::new();
        let key = Key::from("0001");
        pool.insert(Page::new(PageId::from("000")));

        let result = pool.apply(&PageId::from("000"), |page| {
            page.put(key.clone(), Record::new(fields([("n", 2)]), 4));
        });
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(pool.record(&PageId::from("000"), &key).unwrap().version, 4);

        assert!(pool.apply(&PageId::from("xxx"), |_| ()).is_none());
    }

    #[test]
    fn test_evict() {
        let pool = CommittedPagePool::new();
        pool.insert(Page::new(PageId::from("000")));
        assert!(!pool.is_empty());

        pool.evict(&PageId::from("000"));
        assert!(!pool.contains(&PageId::from("000")));
        assert!(pool.is_empty());
    }
}
