// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The resource manager facade.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::storage::{FieldValue, Key, PageId, PageIndex, PageIo, Record};
use crate::wire::Xid;

use super::error::RmError;
use super::journal::{JournalEntry, PrepareJournal};
use super::locks::RowLockManager;
use super::pool::CommittedPagePool;
use super::shadow::{ShadowRecordPool, TxnPhase};

/// How many terminal outcomes to remember for idempotent retries.
const OUTCOME_RETENTION: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    Aborted,
}

/// Bounded memory of finished transactions, so late `commit`/`abort`
/// retries get the original answer. Aborts of unknown xids stay no-ops, so
/// eviction of old entries is safe.
struct TerminalOutcomes {
    order: VecDeque<Xid>,
    map: HashMap<Xid, Outcome>,
}

impl TerminalOutcomes {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    fn record(&mut self, xid: &Xid, outcome: Outcome) {
        if self.map.insert(xid.clone(), outcome).is_none() {
            self.order.push_back(xid.clone());
            if self.order.len() > OUTCOME_RETENTION {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
    }

    fn get(&self, xid: &Xid) -> Option<Outcome> {
        self.map.get(xid).copied()
    }
}

/// A page-based transactional resource manager for one logical table.
///
/// Acts as a facade over the storage primitives: callers see CRUD plus the
/// transaction-control verbs and never touch pages, pools, or the journal
/// directly. All uncommitted modifications live in per-transaction shadow
/// records; committed state changes only in [`commit`](Self::commit).
pub struct ResourceManager<IO: PageIo, IX: PageIndex> {
    table: String,
    index: Arc<IX>,
    page_io: Arc<IO>,
    committed: CommittedPagePool,
    shadow: ShadowRecordPool,
    locks: RowLockManager,
    journal: PrepareJournal,
    outcomes: Mutex<TerminalOutcomes>,
}

impl<IO: PageIo, IX: PageIndex> ResourceManager<IO, IX> {
    /// Opens a resource manager and restores any transactions that were
    /// prepared when the previous process stopped.
    pub fn open(
        table: impl Into<String>,
        index: Arc<IX>,
        page_io: Arc<IO>,
        journal_path: impl Into<PathBuf>,
    ) -> Result<Self, RmError> {
        let rm = Self {
            table: table.into(),
            index,
            page_io,
            committed: CommittedPagePool::new(),
            shadow: ShadowRecordPool::new(),
            locks: RowLockManager::new(),
            journal: PrepareJournal::open(journal_path.into())?,
            outcomes: Mutex::new(TerminalOutcomes::new()),
        };
        rm.recover()?;
        Ok(rm)
    }

    /// Name of the table this manager owns.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of transactions currently prepared and journaled.
    pub fn prepared_count(&self) -> usize {
        self.journal.len()
    }

    /// Current lock owner of a key, if any. Diagnostic surface.
    pub fn lock_holder(&self, raw_key: &str) -> Result<Option<Xid>, RmError> {
        let key = self.index.normalize(raw_key)?;
        Ok(self.locks.holder(&key))
    }

    // ---------------------------------------------------------------
    // Data operations
    // ---------------------------------------------------------------

    /// Reads the record visible to the transaction: its own shadow write if
    /// present, the committed record otherwise. The committed version seen
    /// on first touch is pinned for later optimistic validation.
    pub fn read(&self, xid: &Xid, raw_key: &str) -> Result<Record, RmError> {
        let key = self.index.normalize(raw_key)?;
        let committed = self.committed_record(&key)?;

        let shadowed = self.shadow.with_state(xid, |state| {
            if state.phase == TxnPhase::Active {
                state.observe(&key, &committed);
            }
            state.shadow.get(&key).cloned()
        });

        let effective = shadowed.unwrap_or(committed);
        if !effective.is_live() {
            return Err(RmError::KeyNotFound { key });
        }
        Ok(effective)
    }

    /// Reads the committed record, outside any transaction.
    pub fn read_committed(&self, raw_key: &str) -> Result<Record, RmError> {
        let key = self.index.normalize(raw_key)?;
        let committed = self.committed_record(&key)?;
        if !committed.is_live() {
            return Err(RmError::KeyNotFound { key });
        }
        Ok(committed)
    }

    /// Inserts a record. Fails with `KeyExists` if the record visible to
    /// this transaction is live; inserting over a tombstone continues the
    /// key's version sequence.
    pub fn add(
        &self,
        xid: &Xid,
        raw_key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<(), RmError> {
        let key = self.index.normalize(raw_key)?;
        self.check_not_finished(xid)?;
        let committed = self.committed_record(&key)?;

        self.shadow.with_state(xid, |state| {
            if state.phase != TxnPhase::Active {
                return Err(RmError::InvalidTxnState {
                    xid: xid.clone(),
                    detail: "mutation after prepare",
                });
            }
            state.observe(&key, &committed);

            let effective_live = state
                .shadow
                .get(&key)
                .map(Record::is_live)
                .unwrap_or(committed.is_live());
            if effective_live {
                return Err(RmError::KeyExists { key: key.clone() });
            }

            let base = state.observed_version(&key).unwrap_or(committed.version);
            state.shadow.insert(key.clone(), Record::new(fields, base));
            Ok(())
        })
    }

    /// Merges a partial update into the record visible to this transaction.
    pub fn update(
        &self,
        xid: &Xid,
        raw_key: &str,
        patch: BTreeMap<String, FieldValue>,
    ) -> Result<(), RmError> {
        let key = self.index.normalize(raw_key)?;
        self.check_not_finished(xid)?;
        let committed = self.committed_record(&key)?;

        self.shadow.with_state(xid, |state| {
            if state.phase != TxnPhase::Active {
                return Err(RmError::InvalidTxnState {
                    xid: xid.clone(),
                    detail: "mutation after prepare",
                });
            }
            state.observe(&key, &committed);

            let effective = state.shadow.get(&key).cloned().unwrap_or(committed.clone());
            if !effective.is_live() {
                return Err(RmError::KeyNotFound { key: key.clone() });
            }

            let mut merged = effective;
            merged.merge_patch(&patch);
            state.shadow.insert(key.clone(), merged);
            Ok(())
        })
    }

    /// Writes a shadow tombstone for the record visible to this transaction.
    pub fn delete(&self, xid: &Xid, raw_key: &str) -> Result<(), RmError> {
        let key = self.index.normalize(raw_key)?;
        self.check_not_finished(xid)?;
        let committed = self.committed_record(&key)?;

        self.shadow.with_state(xid, |state| {
            if state.phase != TxnPhase::Active {
                return Err(RmError::InvalidTxnState {
                    xid: xid.clone(),
                    detail: "mutation after prepare",
                });
            }
            state.observe(&key, &committed);

            let effective_live = state
                .shadow
                .get(&key)
                .map(Record::is_live)
                .unwrap_or(committed.is_live());
            if !effective_live {
                return Err(RmError::KeyNotFound { key: key.clone() });
            }

            let base = state.observed_version(&key).unwrap_or(committed.version);
            state.shadow.insert(key.clone(), Record::tombstone(base));
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Transaction control
    // ---------------------------------------------------------------

    /// First phase of two-phase commit.
    ///
    /// Locks the shadow keys in sorted order (non-blocking; a conflict
    /// fails the whole prepare), validates every shadow write against the
    /// current committed record, and makes the prepared state durable
    /// before acknowledging. Idempotent for an already-prepared xid; an
    /// empty shadow set prepares trivially and holds no locks.
    pub fn prepare(&self, xid: &Xid) -> Result<(), RmError> {
        if let Some(outcome) = self.outcome(xid) {
            return Err(RmError::InvalidTxnState {
                xid: xid.clone(),
                detail: match outcome {
                    Outcome::Committed => "transaction already committed",
                    Outcome::Aborted => "transaction already aborted",
                },
            });
        }

        let snapshot = self.shadow.with_existing(xid, |state| state.clone());
        let Some(state) = snapshot else {
            // Nothing was ever written or read under this xid here.
            return Ok(());
        };
        if state.phase == TxnPhase::Prepared {
            return Ok(());
        }

        let keys = state.sorted_keys();
        if keys.is_empty() {
            self.shadow.with_state(xid, |s| s.phase = TxnPhase::Prepared);
            return Ok(());
        }

        // Lock pass, sorted order. All-or-nothing.
        for key in &keys {
            if !self.locks.try_lock(xid, key) {
                debug!(table = %self.table, xid = %xid, key = %key, "prepare lock conflict");
                self.locks.release_all(xid);
                return Err(RmError::LockConflict { key: key.clone() });
            }
        }

        // Validation pass against current committed records.
        if let Err(err) = self.validate(&state.start_version, &state.observed_deleted, &keys) {
            warn!(table = %self.table, xid = %xid, %err, "prepare validation failed");
            self.locks.release_all(xid);
            return Err(err);
        }

        // Durable prepare snapshot, then flip the phase.
        let mut journaled = state.clone();
        journaled.held_locks = keys.iter().cloned().collect();
        if let Err(err) = self.journal.record(JournalEntry::from_state(xid, &journaled)) {
            self.locks.release_all(xid);
            let _ = self.journal.clear(xid);
            return Err(err.into());
        }

        self.shadow.with_state(xid, |s| {
            s.held_locks = keys.iter().cloned().collect();
            s.phase = TxnPhase::Prepared;
        });
        debug!(table = %self.table, xid = %xid, keys = keys.len(), "prepared");
        Ok(())
    }

    /// Second phase: merges the shadow into committed state.
    ///
    /// Every modified key commits at `observed version + 1`; the touched
    /// pages are written through the backend; locks, journal entry, and
    /// transaction state are released. Requires a prepared transaction;
    /// idempotent once committed (including after restart), and a no-op for
    /// unknown xids.
    pub fn commit(&self, xid: &Xid) -> Result<(), RmError> {
        if let Some(outcome) = self.outcome(xid) {
            return match outcome {
                Outcome::Committed => Ok(()),
                Outcome::Aborted => Err(RmError::InvalidTxnState {
                    xid: xid.clone(),
                    detail: "transaction already aborted",
                }),
            };
        }

        let snapshot = self.shadow.with_existing(xid, |state| {
            (state.phase, state.shadow.clone(), state.start_version.clone())
        });
        let Some((phase, shadow, start_version)) = snapshot else {
            return Ok(());
        };

        if shadow.is_empty() {
            self.shadow.remove(xid);
            self.finish(xid, Outcome::Committed);
            return Ok(());
        }
        if phase != TxnPhase::Prepared {
            return Err(RmError::InvalidTxnState {
                xid: xid.clone(),
                detail: "commit before prepare",
            });
        }

        // Bump versions and group the post-images by page.
        let mut touched: BTreeMap<PageId, Vec<(Key, Record)>> = BTreeMap::new();
        for (key, pending) in &shadow {
            let base = start_version.get(key).copied().unwrap_or(pending.version);
            let mut record = pending.clone();
            record.version = base + 1;
            touched
                .entry(self.index.page_of(key))
                .or_default()
                .push((key.clone(), record));
        }

        for (page_id, records) in &touched {
            self.ensure_page(page_id)?;
            // Version-monotonic merge: re-applying after a crash or a
            // backend retry cannot regress a key.
            let merged = self
                .committed
                .apply(page_id, |page| {
                    for (key, record) in records {
                        let current = page.get(key).map(|c| c.version).unwrap_or(0);
                        if record.version > current {
                            page.put(key.clone(), record.clone());
                        }
                    }
                })
                .ok_or_else(|| {
                    RmError::Invariant(format!("committed page {page_id} missing during commit"))
                })?;
            self.page_io.page_out(&merged)?;
        }

        self.locks.release_all(xid);
        self.journal.clear(xid)?;
        self.shadow.remove(xid);
        self.finish(xid, Outcome::Committed);
        info!(table = %self.table, xid = %xid, keys = shadow.len(), "committed");
        Ok(())
    }

    /// Discards the transaction's shadow writes and releases its locks.
    /// Legal from any phase; aborting an unknown or finished xid is a
    /// no-op.
    pub fn abort(&self, xid: &Xid) -> Result<(), RmError> {
        if self.outcome(xid).is_some() {
            return Ok(());
        }

        let existed = self.shadow.remove(xid).is_some();
        self.locks.release_all(xid);
        self.journal.clear(xid)?;
        if existed {
            self.finish(xid, Outcome::Aborted);
            debug!(table = %self.table, xid = %xid, "aborted");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Loads the page for a key into the committed pool if absent and
    /// returns the committed view of the key (an absent marker when the key
    /// has never been committed).
    fn committed_record(&self, key: &Key) -> Result<Record, RmError> {
        let page_id = self.index.page_of(key);
        self.ensure_page(&page_id)?;
        Ok(self
            .committed
            .record(&page_id, key)
            .unwrap_or_else(Record::absent))
    }

    fn ensure_page(&self, page_id: &PageId) -> Result<(), RmError> {
        if !self.committed.contains(page_id) {
            let page = self.page_io.page_in(page_id)?;
            self.committed.insert(page);
        }
        Ok(())
    }

    fn validate(
        &self,
        start_version: &HashMap<Key, u64>,
        observed_deleted: &HashMap<Key, bool>,
        keys: &[Key],
    ) -> Result<(), RmError> {
        for key in keys {
            let committed = self.committed_record(key)?;
            let observed = start_version.get(key).copied().unwrap_or(0);
            let was_deleted = observed_deleted.get(key).copied().unwrap_or(true);

            if was_deleted {
                // Insert intent: the key must still be free.
                if committed.is_live() {
                    return Err(RmError::KeyExists { key: key.clone() });
                }
            } else {
                // Update/delete intent: the key must still exist.
                if !committed.is_live() {
                    return Err(RmError::KeyNotFound { key: key.clone() });
                }
            }
            if committed.version != observed {
                return Err(RmError::VersionConflict {
                    key: key.clone(),
                    observed,
                    committed: committed.version,
                });
            }
        }
        Ok(())
    }

    /// Recovery: replay the journal, re-acquire locks, restore `Prepared`.
    ///
    /// Lock re-acquisition cannot conflict: no other transaction can have
    /// been running concurrently with a crashed process.
    fn recover(&self) -> Result<(), RmError> {
        let entries = self.journal.entries();
        for entry in entries {
            let (xid, state) = entry.into_state();
            for key in &state.held_locks {
                if !self.locks.try_lock(&xid, key) {
                    return Err(RmError::Invariant(format!(
                        "recovered lock on {key} is already held"
                    )));
                }
            }
            info!(
                table = %self.table,
                xid = %xid,
                keys = state.shadow.len(),
                "restored prepared transaction from journal"
            );
            self.shadow.restore(xid, state);
        }
        Ok(())
    }

    fn check_not_finished(&self, xid: &Xid) -> Result<(), RmError> {
        match self.outcome(xid) {
            None => Ok(()),
            Some(Outcome::Committed) => Err(RmError::InvalidTxnState {
                xid: xid.clone(),
                detail: "transaction already committed",
            }),
            Some(Outcome::Aborted) => Err(RmError::InvalidTxnState {
                xid: xid.clone(),
                detail: "transaction already aborted",
            }),
        }
    }

    fn outcome(&self, xid: &Xid) -> Option<Outcome> {
        self.outcomes.lock().get(xid)
    }

    fn finish(&self, xid: &Xid, outcome: Outcome) {
        self.outcomes.lock().record(xid, outcome);
    }
}
