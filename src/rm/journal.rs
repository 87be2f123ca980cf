// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Durable snapshot of prepared transactions.
//!
//! One journal file per resource manager. Every mutation rewrites the full
//! prepared set to a temporary file, fsyncs it, and renames it over the
//! target, so the file on disk is always a complete, consistent snapshot:
//! a crash mid-write leaves the previous snapshot intact. On restart the
//! file is replayed in its entirety.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::{Key, Record, StorageError};
use crate::wire::Xid;

use super::shadow::{TxnPhase, TxnState};

/// One prepared transaction as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub xid: Xid,
    pub shadow: BTreeMap<Key, Record>,
    pub start_version: BTreeMap<Key, u64>,
    pub observed_deleted: BTreeMap<Key, bool>,
    pub held_keys: Vec<Key>,
}

impl JournalEntry {
    /// Snapshots a prepared transaction's state.
    pub fn from_state(xid: &Xid, state: &TxnState) -> Self {
        Self {
            xid: xid.clone(),
            shadow: state.shadow.clone(),
            start_version: state.start_version.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            observed_deleted: state
                .observed_deleted
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            held_keys: state.held_locks.iter().cloned().collect(),
        }
    }

    /// Re-materializes the prepared transaction state.
    pub fn into_state(self) -> (Xid, TxnState) {
        let state = TxnState {
            shadow: self.shadow,
            start_version: self.start_version.into_iter().collect(),
            observed_deleted: self.observed_deleted.into_iter().collect(),
            held_locks: self.held_keys.into_iter().collect(),
            phase: TxnPhase::Prepared,
        };
        (self.xid, state)
    }
}

/// Durable registry of prepared transactions, one file per manager.
pub struct PrepareJournal {
    path: PathBuf,
    entries: Mutex<BTreeMap<Xid, JournalEntry>>,
}

impl PrepareJournal {
    /// Opens a journal, loading any snapshot left by a previous process.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<JournalEntry> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|e| (e.xid.clone(), e)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Adds or replaces an entry and makes the snapshot durable before
    /// returning.
    pub fn record(&self, entry: JournalEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(entry.xid.clone(), entry);
        self.persist(&entries)
    }

    /// Drops an entry. A no-op (and no rewrite) if the xid has none.
    pub fn clear(&self, xid: &Xid) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if entries.remove(xid).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// The current prepared set, as loaded or last written.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<Xid, JournalEntry>) -> Result<(), StorageError> {
        let list: Vec<&JournalEntry> = entries.values().collect();
        let bytes = serde_json::to_vec(&list)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fields;
    use tempfile::TempDir;

    fn entry(xid: &str, key: &str) -> JournalEntry {
        let xid = Xid::from(xid);
        let mut state = TxnState::new();
        let key = Key::from(key);
        state.observe(&key, &Record::new(fields([("n", 1)]), 2));
        state.shadow.insert(key.clone(), Record::new(fields([("n", 9)]), 2));
        state.held_locks.insert(key);
        JournalEntry::from_state(&xid, &state)
    }

    #[test]
    fn test_missing_file_replays_empty() {
        let dir = TempDir::new().unwrap();
        let journal = PrepareJournal::open(dir.path().join("prepared.json")).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn test_record_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepared.json");

        let journal = PrepareJournal::open(&path).unwrap();
        journal.record(entry("tx-1", "0001")).unwrap();
        journal.record(entry("tx-2", "0002")).unwrap();
        drop(journal);

        let journal = PrepareJournal::open(&path).unwrap();
        assert_eq!(journal.len(), 2);

        let entries = journal.entries();
        let (xid, state) = entries[0].clone().into_state();
        assert_eq!(xid, Xid::from("tx-1"));
        assert_eq!(state.phase, TxnPhase::Prepared);
        assert_eq!(state.observed_version(&Key::from("0001")), Some(2));
        assert!(state.held_locks.contains(&Key::from("0001")));
    }

    #[test]
    fn test_clear_removes_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepared.json");

        let journal = PrepareJournal::open(&path).unwrap();
        journal.record(entry("tx-1", "0001")).unwrap();
        journal.clear(&Xid::from("tx-1")).unwrap();
        journal.clear(&Xid::from("tx-unknown")).unwrap();
        drop(journal);

        let journal = PrepareJournal::open(&path).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn test_record_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let journal = PrepareJournal::open(dir.path().join("prepared.json")).unwrap();

        journal.record(entry("tx-1", "0001")).unwrap();
        journal.record(entry("tx-1", "0002")).unwrap();

        assert_eq!(journal.len(), 1);
        let entries = journal.entries();
        assert!(entries[0].shadow.contains_key(&Key::from("0002")));
    }

    #[test]
    fn test_snapshot_is_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepared.json");

        let journal = PrepareJournal::open(&path).unwrap();
        journal.record(entry("tx-1", "0001")).unwrap();

        // The on-disk file is a complete JSON array at all times.
        let bytes = fs::read(&path).unwrap();
        let parsed: Vec<JournalEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
