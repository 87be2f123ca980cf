// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-table resource manager with copy-on-write transaction isolation.
//!
//! This module ties the storage primitives together behind the
//! [`ResourceManager`] facade: reads and writes run against per-transaction
//! **shadow records** layered over a committed page cache, so committed
//! state is never touched before commit. Concurrency control is hybrid:
//!
//! - Writes acquire **no** locks. Row locks are taken only during
//!   [`prepare`](ResourceManager::prepare), in sorted key order, which
//!   rules out cross-transaction lock cycles.
//! - Prepare then validates every shadow write against the current
//!   committed record: insert-over-existing, update-of-missing, and stale
//!   versions (optimistic check against the version observed at first
//!   touch) each fail with their own error and abort the transaction
//!   globally.
//! - A prepared transaction's shadow, observed versions, and lock set are
//!   made durable in the [`PrepareJournal`] by atomic file replacement
//!   before `prepare` acknowledges, so a crashed manager restores its
//!   prepared transactions on restart and the coordinator's decision still
//!   applies.
//!
//! Commit merges the shadow into the committed pool at `observed + 1`
//! versions and writes the touched pages through [`PageIo`]; abort discards
//! the shadow. Both are idempotent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use voyagedb::rm::ResourceManager;
//! use voyagedb::storage::{fields, MemPageIo, PrefixOrderedIndex};
//! use voyagedb::wire::Xid;
//!
//! # fn main() -> Result<(), voyagedb::rm::RmError> {
//! let dir = tempfile::tempdir().unwrap();
//! let index = Arc::new(PrefixOrderedIndex::new(4, 10));
//! let io = Arc::new(MemPageIo::new(index.clone()));
//! let rm = ResourceManager::open("FLIGHTS", index, io, dir.path().join("prepared.json"))?;
//!
//! let xid = Xid::generate();
//! rm.add(&xid, "0001", fields([("price", 300), ("numAvail", 5)]))?;
//! rm.prepare(&xid)?;
//! rm.commit(&xid)?;
//!
//! let rec = rm.read_committed("0001")?;
//! assert_eq!(rec.int_field("numAvail"), Some(5));
//! # Ok(())
//! # }
//! ```

mod error;
mod journal;
mod locks;
mod manager;
mod pool;
mod shadow;

pub use error::RmError;
pub use journal::{JournalEntry, PrepareJournal};
pub use locks::RowLockManager;
pub use manager::ResourceManager;
pub use pool::CommittedPagePool;
pub use shadow::{ShadowRecordPool, TxnPhase, TxnState};
