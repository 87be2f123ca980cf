// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Paged key-to-record storage primitives.
//!
//! Each resource manager owns one logical table and accesses it in units of
//! **pages**: buckets of records sharing a routing property decided by a
//! [`PageIndex`] strategy. The backend store is reached only through the
//! narrow [`PageIo`] contract, which needs nothing more than a range scan
//! per page and an atomic upsert-or-delete of a page's records.
//!
//! # Key Concepts
//!
//! ## Versioned records
//!
//! A [`Record`] is an immutable snapshot: a field map plus a per-key
//! `version` counter and a `deleted` tombstone flag. The committed version
//! of a key never decreases; a key that was deleted at version `v` still
//! occupies `v`, so a later re-insert commits at `v + 1` rather than
//! starting over. A key that has never been committed is modeled as
//! `version = 0, deleted = true`.
//!
//! ## Page routing
//!
//! Three index strategies map keys to pages:
//!
//! - [`PrefixOrderedIndex`]: fixed-width string keys, pages keyed by a
//!   configurable-length prefix of the key.
//! - [`CompositeFixedWidthIndex`]: multi-column keys, each column padded to
//!   a declared width; the page id is the encoding of the leading columns.
//! - [`LinearBucketIndex`]: integer keys bucketed by division.
//!
//! # Example
//!
//! ```
//! use voyagedb::storage::{MemPageIo, PageIndex, PageIo, PrefixOrderedIndex};
//! use std::sync::Arc;
//!
//! let index = Arc::new(PrefixOrderedIndex::new(4, 10));
//! let io = MemPageIo::new(index.clone());
//!
//! let key = index.normalize("17").unwrap();
//! assert_eq!(key.as_str(), "0017");
//!
//! // A page that has never been written comes back empty.
//! let page = io.page_in(&index.page_of(&key)).unwrap();
//! assert!(page.is_empty());
//! ```

mod error;
mod index;
mod page;
mod page_io;
mod record;
mod rocks;

pub use error::StorageError;
pub use index::{CompositeFixedWidthIndex, LinearBucketIndex, PageIndex, PrefixOrderedIndex};
pub use page::{Page, PageId};
pub use page_io::{MemPageIo, PageIo};
pub use record::{fields, FieldValue, Key, Record};
pub use rocks::{DurabilityMode, RocksPageIo};
