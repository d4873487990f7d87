//! # Tables and Key Histories
//!
//! A table is a named mapping from byte-string keys to key histories, ordered
//! lexicographically on key bytes. A key history holds the committed updates
//! for the key plus at most one non-committed, non-aborted update per active
//! transaction that has written it.
//!
//! ## Read Path
//!
//! ```text
//! Table::get_*(key, read_ts, reader?)
//!    │
//!    ├─ reader's own pending/prepared write → return it (read-your-writes)
//!    │
//!    ├─ prepared update from another transaction is a visible candidate
//!    │      → PREPARE_CONFLICT
//!    │
//!    └─ committed update with the greatest (commit_ts, commit_seq)
//!       such that commit_ts <= read_ts → value, or NONE for a tombstone
//! ```
//!
//! ## Keys
//!
//! Keys are stored as `Arc<[u8]>` so cursors can retain stable references to
//! them across a batch without copying; the map itself answers range queries
//! against plain `&[u8]` positions.
//!
//! ## Thread Safety
//!
//! The row map sits behind a `parking_lot::RwLock`: readers never block
//! readers, and writers hold the lock only for the single-key mutation.
//! Commit-time transitions are additionally serialized by the database-level
//! commit lock, which this module never takes itself.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use eyre::Result;
use parking_lot::RwLock;

use super::checkpoint::{Checkpoint, CheckpointTable, CheckpointUpdate};
use super::timestamp::{Timestamp, TxnId, TS_LATEST, TS_NONE};
use super::transaction::Transaction;
use super::update::{Update, UpdateState};
use crate::error::ErrorCode;
use crate::{bail_code, ensure_code};

/// Raw byte-string format tag, the only format block cursors accept.
pub const RAW_FORMAT: &str = "u";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableType {
    #[default]
    Row,
    Column,
}

#[derive(Debug, Clone)]
pub struct TableConfig {
    pub table_type: TableType,
    pub key_format: String,
    pub value_format: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_type: TableType::Row,
            key_format: RAW_FORMAT.to_string(),
            value_format: RAW_FORMAT.to_string(),
        }
    }
}

#[derive(Default)]
pub(crate) struct KeyHistory {
    updates: Vec<Update>,
}

impl KeyHistory {
    /// The reader transaction's own non-resolved write, if any. The key
    /// history invariant allows at most one.
    fn own_write(&self, txn_id: TxnId) -> Option<&Update> {
        self.updates.iter().rev().find(|u| {
            u.txn_id == txn_id
                && matches!(u.state, UpdateState::Pending | UpdateState::Prepared)
        })
    }

    fn own_write_mut(&mut self, txn_id: TxnId) -> Option<&mut Update> {
        self.updates.iter_mut().rev().find(|u| {
            u.txn_id == txn_id
                && matches!(u.state, UpdateState::Pending | UpdateState::Prepared)
        })
    }

    /// True when a prepared update from another transaction would be the
    /// visible candidate for a reader at `read_ts`.
    fn prepared_conflict(&self, read_ts: Timestamp, exclude: Option<TxnId>) -> bool {
        self.updates.iter().any(|u| {
            u.state == UpdateState::Prepared
                && Some(u.txn_id) != exclude
                && (read_ts == TS_LATEST || u.prepare_ts <= read_ts)
        })
    }

    fn visible_committed(&self, read_ts: Timestamp) -> Option<&Update> {
        self.updates
            .iter()
            .filter(|u| u.committed_visible_at(read_ts))
            .max_by_key(|u| (u.commit_ts, u.commit_seq))
    }
}

pub struct Table {
    name: String,
    config: TableConfig,
    rows: RwLock<BTreeMap<Arc<[u8]>, KeyHistory>>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Table {
    pub(crate) fn new(name: impl Into<String>, config: TableConfig) -> Self {
        Self {
            name: name.into(),
            config,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Writes `value` for `key` in the transaction.
    pub fn insert(&self, txn: &Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        txn.check_writable()?;
        self.apply_write(txn.id(), key, Some(value.to_vec()));
        txn.record_write(&self.name, key);
        Ok(())
    }

    /// Writes a tombstone for `key` in the transaction. Removing a key the
    /// transaction cannot see is `NOT_FOUND`.
    pub fn remove(&self, txn: &Transaction, key: &[u8]) -> Result<()> {
        txn.check_writable()?;
        if self.get_txn(txn, key)?.is_none() {
            bail_code!(
                ErrorCode::NotFound,
                "key not present in table {:?}",
                self.name
            );
        }
        self.apply_write(txn.id(), key, None);
        txn.record_write(&self.name, key);
        Ok(())
    }

    /// Reads `key` within the transaction: the transaction's own writes
    /// first, then its snapshot.
    pub fn get_txn(&self, txn: &Transaction, key: &[u8]) -> Result<Option<Vec<u8>>> {
        txn.check_readable()?;
        self.read(key, txn.read_ts(), Some(txn.id()))
    }

    /// Reads the newest committed value for `key`.
    pub fn get_latest(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read(key, TS_LATEST, None)
    }

    /// Reads `key` as of the read timestamp.
    pub fn get_at(&self, key: &[u8], read_ts: Timestamp) -> Result<Option<Vec<u8>>> {
        self.read(key, read_ts, None)
    }

    /// Reads `key` from a checkpoint, optionally bounded by a debug read
    /// timestamp overlaid on the checkpoint.
    pub fn get_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        key: &[u8],
        read_ts: Option<Timestamp>,
    ) -> Result<Option<Vec<u8>>> {
        Ok(checkpoint
            .table(&self.name)
            .and_then(|table| table.get(key, read_ts)))
    }

    fn read(
        &self,
        key: &[u8],
        read_ts: Timestamp,
        own: Option<TxnId>,
    ) -> Result<Option<Vec<u8>>> {
        let rows = self.rows.read();
        match rows.get(key) {
            Some(history) => self.history_value(history, read_ts, own),
            None => Ok(None),
        }
    }

    fn history_value(
        &self,
        history: &KeyHistory,
        read_ts: Timestamp,
        own: Option<TxnId>,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(id) = own {
            if let Some(update) = history.own_write(id) {
                return Ok(update.value.clone());
            }
        }
        ensure_code!(
            !history.prepared_conflict(read_ts, own),
            ErrorCode::PrepareConflict,
            "read in table {:?} found a prepared update",
            self.name
        );
        Ok(history
            .visible_committed(read_ts)
            .and_then(|u| u.value.clone()))
    }

    /// Next key after `after` (or the first key) with a value visible to the
    /// reader; `None` when the table is exhausted.
    pub(crate) fn walk_next(
        &self,
        after: Option<&[u8]>,
        read_ts: Timestamp,
        own: Option<TxnId>,
    ) -> Result<Option<(Arc<[u8]>, Vec<u8>)>> {
        let rows = self.rows.read();
        let range = match after {
            Some(pos) => rows.range::<[u8], _>((Bound::Excluded(pos), Bound::Unbounded)),
            None => rows.range::<[u8], _>(..),
        };
        for (key, history) in range {
            if let Some(value) = self.history_value(history, read_ts, own)? {
                return Ok(Some((Arc::clone(key), value)));
            }
        }
        Ok(None)
    }

    /// Previous key before `before` (or the last key) with a visible value.
    pub(crate) fn walk_prev(
        &self,
        before: Option<&[u8]>,
        read_ts: Timestamp,
        own: Option<TxnId>,
    ) -> Result<Option<(Arc<[u8]>, Vec<u8>)>> {
        let rows = self.rows.read();
        let range = match before {
            Some(pos) => rows.range::<[u8], _>((Bound::Unbounded, Bound::Excluded(pos))),
            None => rows.range::<[u8], _>(..),
        };
        for (key, history) in range.rev() {
            if let Some(value) = self.history_value(history, read_ts, own)? {
                return Ok(Some((Arc::clone(key), value)));
            }
        }
        Ok(None)
    }

    /// Creates or replaces the transaction's pending update for `key`.
    pub(crate) fn apply_write(&self, txn_id: TxnId, key: &[u8], value: Option<Vec<u8>>) {
        let mut rows = self.rows.write();
        if !rows.contains_key(key) {
            rows.insert(Arc::from(key), KeyHistory::default());
        }
        let history = rows.get_mut(key).expect("key history just inserted");
        match history.own_write_mut(txn_id) {
            Some(update) => update.value = value,
            None => history.updates.push(Update::pending(txn_id, value)),
        }
    }

    pub(crate) fn prepare_update(&self, key: &[u8], txn_id: TxnId, prepare_ts: Timestamp) {
        let mut rows = self.rows.write();
        if let Some(update) = rows.get_mut(key).and_then(|h| h.own_write_mut(txn_id)) {
            update.state = UpdateState::Prepared;
            update.prepare_ts = prepare_ts;
        }
    }

    /// Commits the transaction's update on `key`. A committed update already
    /// holding this commit timestamp is replaced, keeping commit timestamps
    /// unique per key.
    pub(crate) fn commit_update(
        &self,
        key: &[u8],
        txn_id: TxnId,
        commit_ts: Timestamp,
        durable_ts: Timestamp,
        commit_seq: u64,
    ) {
        let mut rows = self.rows.write();
        let Some(history) = rows.get_mut(key) else {
            return;
        };
        if commit_ts != TS_NONE {
            history
                .updates
                .retain(|u| !(u.state == UpdateState::Committed && u.commit_ts == commit_ts));
        }
        if let Some(update) = history.own_write_mut(txn_id) {
            update.state = UpdateState::Committed;
            update.commit_ts = commit_ts;
            update.durable_ts = durable_ts;
            update.commit_seq = commit_seq;
        }
    }

    pub(crate) fn abort_update(&self, key: &[u8], txn_id: TxnId) {
        let mut rows = self.rows.write();
        if let Some(update) = rows.get_mut(key).and_then(|h| h.own_write_mut(txn_id)) {
            update.state = UpdateState::Aborted;
        }
    }

    /// True when another transaction committed `key` after the committing
    /// transaction began; the second committer loses.
    pub(crate) fn has_commit_conflict(
        &self,
        key: &[u8],
        txn_id: TxnId,
        begin_seq: u64,
    ) -> bool {
        let rows = self.rows.read();
        rows.get(key).is_some_and(|history| {
            history.updates.iter().any(|u| {
                u.state == UpdateState::Committed
                    && u.txn_id != txn_id
                    && u.commit_seq > begin_seq
            })
        })
    }

    /// Captures the committed state visible to a checkpoint created now.
    pub(crate) fn capture_checkpoint(&self, stable_ts: Option<Timestamp>) -> CheckpointTable {
        let rows = self.rows.read();
        let mut captured = BTreeMap::new();
        for (key, history) in rows.iter() {
            let updates: Vec<CheckpointUpdate> = history
                .updates
                .iter()
                .filter(|u| {
                    u.state == UpdateState::Committed
                        && stable_ts
                            .is_none_or(|s| u.commit_ts <= s && u.durable_ts <= s)
                })
                .map(|u| CheckpointUpdate {
                    commit_ts: u.commit_ts,
                    commit_seq: u.commit_seq,
                    value: u.value.clone(),
                })
                .collect();
            if !updates.is_empty() {
                captured.insert(Arc::clone(key), updates);
            }
        }
        CheckpointTable::new(captured)
    }
}
