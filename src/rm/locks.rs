// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-key exclusive row locks owned by transaction ids.
//!
//! Locks are taken only during prepare and only with the non-blocking
//! [`try_lock`](RowLockManager::try_lock); a conflict surfaces immediately
//! as a failure instead of queueing a waiter. Deadlock freedom comes from
//! the caller acquiring keys in sorted order, so no wait-for graph and no
//! wound-wait machinery is needed here.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

use crate::storage::Key;
use crate::wire::Xid;

const NUM_SHARDS: usize = 64;

/// A shard of the lock map.
struct LockShard {
    owners: HashMap<Key, Xid>,
}

impl LockShard {
    fn new() -> Self {
        Self {
            owners: HashMap::new(),
        }
    }
}

/// Sharded per-key exclusive lock table.
pub struct RowLockManager {
    shards: [Mutex<LockShard>; NUM_SHARDS],
}

impl RowLockManager {
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| Mutex::new(LockShard::new())),
        }
    }

    #[inline]
    fn shard_index(&self, key: &Key) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize % NUM_SHARDS
    }

    /// Attempts to lock a key for the given transaction.
    ///
    /// Succeeds if the key is unlocked or already owned by the same xid
    /// (reentrance is a no-op). Never blocks.
    pub fn try_lock(&self, xid: &Xid, key: &Key) -> bool {
        let mut shard = self.shards[self.shard_index(key)].lock();
        match shard.owners.get(key) {
            None => {
                shard.owners.insert(key.clone(), xid.clone());
                true
            }
            Some(owner) => owner == xid,
        }
    }

    /// Releases every key owned by the transaction.
    pub fn release_all(&self, xid: &Xid) {
        for shard in &self.shards {
            shard.lock().owners.retain(|_, owner| owner != xid);
        }
    }

    /// Current owner of a key, if locked.
    pub fn holder(&self, key: &Key) -> Option<Xid> {
        self.shards[self.shard_index(key)]
            .lock()
            .owners
            .get(key)
            .cloned()
    }
}

impl Default for RowLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_free_key() {
        let locks = RowLockManager::new();
        let key = Key::from("0001");
        let xid = Xid::from("tx-1");

        assert!(locks.try_lock(&xid, &key));
        assert_eq!(locks.holder(&key), Some(xid));
    }

    #[test]
    fn test_reentrant_lock_is_noop() {
        let locks = RowLockManager::new();
        let key = Key::from("0001");
        let xid = Xid::from("tx-1");

        assert!(locks.try_lock(&xid, &key));
        assert!(locks.try_lock(&xid, &key));
        assert_eq!(locks.holder(&key), Some(xid));
    }

    #[test]
    fn test_conflict_fails_without_blocking() {
        let locks = RowLockManager::new();
        let key = Key::from("0001");

        assert!(locks.try_lock(&Xid::from("tx-1"), &key));
        assert!(!locks.try_lock(&Xid::from("tx-2"), &key));
        assert_eq!(locks.holder(&key), Some(Xid::from("tx-1")));
    }

    #[test]
    fn test_release_all() {
        let locks = RowLockManager::new();
        let xid = Xid::from("tx-1");
        let key1 = Key::from("0001");
        let key2 = Key::from("0002");

        assert!(locks.try_lock(&xid, &key1));
        assert!(locks.try_lock(&xid, &key2));

        locks.release_all(&xid);

        assert_eq!(locks.holder(&key1), None);
        assert_eq!(locks.holder(&key2), None);
        assert!(locks.try_lock(&Xid::from("tx-2"), &key1));
    }

    #[test]
    fn test_release_all_leaves_other_owners() {
        let locks = RowLockManager::new();
        let key1 = Key::from("0001");
        let key2 = Key::from("0002");

        assert!(locks.try_lock(&Xid::from("tx-1"), &key1));
        assert!(locks.try_lock(&Xid::from("tx-2"), &key2));

        locks.release_all(&Xid::from("tx-1"));

        assert_eq!(locks.holder(&key1), None);
        assert_eq!(locks.holder(&key2), Some(Xid::from("tx-2")));
    }
}
