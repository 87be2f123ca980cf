// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RocksDB-backed page I/O implementation.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch, WriteOptions,
};

use super::error::StorageError;
use super::index::PageIndex;
use super::page::{Page, PageId};
use super::record::{Key, Record};
use super::PageIo;

/// Durability mode for write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Writes are synced to WAL but not fsynced to disk.
    /// Durable against process crashes but not power failures.
    /// This is the default mode, balancing performance and safety.
    #[default]
    WalOnly,
    /// Writes are fsynced to disk on every page-out.
    /// Durable against power failures but slower.
    FsyncEveryWrite,
}

/// RocksDB-backed page store.
///
/// Rows are keyed by the normalized primary key and hold one JSON-encoded
/// committed [`Record`] each, tombstones included: a deleted key keeps its
/// row so the version counter survives cache eviction and restart. Pages
/// map to contiguous key ranges, loaded with a range scan and written back
/// with an atomic `WriteBatch`.
pub struct RocksPageIo<IX: PageIndex> {
    db: DBWithThreadMode<MultiThreaded>,
    index: Arc<IX>,
    write_opts: WriteOptions,
}

impl<IX: PageIndex> RocksPageIo<IX> {
    /// Opens or creates a database at the given path.
    ///
    /// Uses `DurabilityMode::WalOnly` by default (fast, durable against
    /// process crash).
    pub fn open(path: &Path, index: Arc<IX>) -> Result<Self, StorageError> {
        Self::open_with_durability(path, index, DurabilityMode::default())
    }

    /// Opens or creates a database with the specified durability mode.
    pub fn open_with_durability(
        path: &Path,
        index: Arc<IX>,
        durability: DurabilityMode,
    ) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(16 * 1024 * 1024);
        opts.set_level_compaction_dynamic_level_bytes(true);

        let db = DBWithThreadMode::open(&opts, path)?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(durability == DurabilityMode::FsyncEveryWrite);

        Ok(Self {
            db,
            index,
            write_opts,
        })
    }

    /// Forces a flush to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl<IX: PageIndex> PageIo for RocksPageIo<IX> {
    fn page_in(&self, page_id: &PageId) -> Result<Page, StorageError> {
        let (start, end) = self.index.page_range(page_id);

        let mut page = Page::new(page_id.clone());
        let iter = self
            .db
            .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
        for item in iter {
            let (key_bytes, value) = item?;
            if key_bytes.as_ref() >= end.as_bytes() {
                break;
            }
            let key = String::from_utf8(key_bytes.to_vec()).map_err(|_| {
                StorageError::Corruption("non-utf8 row key in page scan".to_string())
            })?;
            let record: Record = serde_json::from_slice(&value)?;
            page.put(Key::new(key), record);
        }
        Ok(page)
    }

    fn page_out(&self, page: &Page) -> Result<(), StorageError> {
        let (start, end) = self.index.page_range(page.id());

        let mut batch = WriteBatch::default();

        // Delete rows that left the page's record set.
        let iter = self
            .db
            .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
        for item in iter {
            let (key_bytes, _) = item?;
            if key_bytes.as_ref() >= end.as_bytes() {
                break;
            }
            let key = String::from_utf8(key_bytes.to_vec()).map_err(|_| {
                StorageError::Corruption("non-utf8 row key in page scan".to_string())
            })?;
            if !page.contains(&Key::from(key.as_str())) {
                batch.delete(key.as_bytes());
            }
        }

        for (key, record) in page.iter() {
            batch.put(key.as_str().as_bytes(), serde_json::to_vec(record)?);
        }

        self.db.write_opt(batch, &self.write_opts)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::PrefixOrderedIndex;
    use crate::storage::record::fields;
    use tempfile::TempDir;

    fn open_store() -> (Arc<PrefixOrderedIndex>, RocksPageIo<PrefixOrderedIndex>, TempDir) {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(PrefixOrderedIndex::new(4, 10));
        let io = RocksPageIo::open(dir.path(), index.clone()).unwrap();
        (index, io, dir)
    }

    #[test]
    fn test_unwritten_page_is_empty() {
        let (_, io, _dir) = open_store();
        assert!(io.page_in(&PageId::from("001")).unwrap().is_empty());
    }

    #[test]
    fn test_page_roundtrip() {
        let (index, io, _dir) = open_store();
        let key = index.normalize("0017").unwrap();
        let page_id = index.page_of(&key);

        let mut page = Page::new(page_id.clone());
        page.put(key.clone(), Record::new(fields([("price", 300)]), 2));
        io.page_out(&page).unwrap();

        let loaded = io.page_in(&page_id).unwrap();
        assert_eq!(loaded.get(&key).unwrap().int_field("price"), Some(300));
        assert_eq!(loaded.get(&key).unwrap().version, 2);
    }

    #[test]
    fn test_page_out_deletes_absent_keys_in_domain() {
        let (index, io, _dir) = open_store();
        let a = index.normalize("0010").unwrap();
        let b = index.normalize("0011").unwrap();
        let page_id = index.page_of(&a);

        let mut page = Page::new(page_id.clone());
        page.put(a.clone(), Record::new(fields([("n", 1)]), 1));
        page.put(b.clone(), Record::new(fields([("n", 2)]), 1));
        io.page_out(&page).unwrap();

        let mut page = Page::new(page_id.clone());
        page.put(a.clone(), Record::new(fields([("n", 1)]), 1));
        io.page_out(&page).unwrap();

        let loaded = io.page_in(&page_id).unwrap();
        assert!(loaded.contains(&a));
        assert!(!loaded.contains(&b));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(PrefixOrderedIndex::new(4, 10));
        let key = index.normalize("0017").unwrap();
        let page_id = index.page_of(&key);

        {
            let io = RocksPageIo::open(dir.path(), index.clone()).unwrap();
            let mut page = Page::new(page_id.clone());
            page.put(key.clone(), Record::tombstone(5));
            io.page_out(&page).unwrap();
            io.sync().unwrap();
        }

        let io = RocksPageIo::open(dir.path(), index.clone()).unwrap();
        let loaded = io.page_in(&page_id).unwrap();
        assert_eq!(loaded.get(&key).unwrap().version, 5);
        assert!(loaded.get(&key).unwrap().deleted);
    }
}
