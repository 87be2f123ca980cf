// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-transaction shadow state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::{Key, Record};
use crate::wire::Xid;

/// Lifecycle phase of a transaction at this resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnPhase {
    /// Accepting reads and shadow writes.
    Active,
    /// Validated, locked, and journaled; awaiting the coordinator.
    Prepared,
    /// Committed or aborted; all locks released.
    Done,
}

/// Everything a transaction has accumulated at this resource manager.
///
/// Invariants: `held_locks` covers every shadow key once the phase is
/// `Prepared`, and is empty once `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnState {
    /// Pending post-images (tombstones included), invisible to other xids.
    pub shadow: BTreeMap<Key, Record>,
    /// Committed version observed when the key was first touched.
    pub start_version: HashMap<Key, u64>,
    /// Whether the committed view was deleted/absent at first touch;
    /// distinguishes insert intent from update/delete at validation time.
    pub observed_deleted: HashMap<Key, bool>,
    /// Keys this transaction currently holds the write lock for.
    pub held_locks: BTreeSet<Key>,
    pub phase: TxnPhase,
}

impl TxnState {
    pub fn new() -> Self {
        Self {
            shadow: BTreeMap::new(),
            start_version: HashMap::new(),
            observed_deleted: HashMap::new(),
            held_locks: BTreeSet::new(),
            phase: TxnPhase::Active,
        }
    }

    /// Records the committed view observed at first touch. Later touches
    /// keep the original observation.
    pub fn observe(&mut self, key: &Key, committed: &Record) {
        if !self.start_version.contains_key(key) {
            self.start_version.insert(key.clone(), committed.version);
            self.observed_deleted.insert(key.clone(), committed.deleted);
        }
    }

    /// The committed version this transaction validated against.
    pub fn observed_version(&self, key: &Key) -> Option<u64> {
        self.start_version.get(key).copied()
    }

    /// Sorted shadow keys, the lock acquisition order.
    pub fn sorted_keys(&self) -> Vec<Key> {
        self.shadow.keys().cloned().collect()
    }
}

impl Default for TxnState {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of per-transaction state, keyed by xid.
pub struct ShadowRecordPool {
    states: Mutex<HashMap<Xid, TxnState>>,
}

impl ShadowRecordPool {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Runs a closure with the transaction's state, creating it on first
    /// touch.
    pub fn with_state<T>(&self, xid: &Xid, f: impl FnOnce(&mut TxnState) -> T) -> T {
        let mut states = self.states.lock();
        f(states.entry(xid.clone()).or_default())
    }

    /// Runs a closure with the transaction's state if it exists.
    pub fn with_existing<T>(&self, xid: &Xid, f: impl FnOnce(&mut TxnState) -> T) -> Option<T> {
        self.states.lock().get_mut(xid).map(f)
    }

    /// Removes and returns the transaction's state.
    pub fn remove(&self, xid: &Xid) -> Option<TxnState> {
        self.states.lock().remove(xid)
    }

    /// Restores a state wholesale (recovery path).
    pub fn restore(&self, xid: Xid, state: TxnState) {
        self.states.lock().insert(xid, state);
    }

    /// Number of transactions currently tracked.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

impl Default for ShadowRecordPool {
    fn default() -> Self {
        Self::new()
    }
}
