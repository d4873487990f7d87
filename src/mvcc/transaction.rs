//! # Transactions
//!
//! This module implements the transaction state machine of the reference
//! model:
//!
//! ```text
//! ┌─────────┐  prepare(ts)  ┌──────────┐
//! │ Active  │ ────────────> │ Prepared │
//! └─────────┘               └──────────┘
//!   │      │                   │      │
//!   │      │ commit(cts,dts?)  │      │ commit: cts >= prepare_ts,
//!   │      v                   v      │         cts >= stable_ts
//!   │   ┌───────────┐    ┌───────────┐│
//!   │   │ Committed │    │ Committed ││
//!   │   └───────────┘    └───────────┘│
//!   │ rollback()                      │ rollback()
//!   v                                 v
//! ┌─────────┐                    ┌─────────┐
//! │ Aborted │                    │ Aborted │
//! └─────────┘                    └─────────┘
//! ```
//!
//! Terminal states are immutable; any further operation, a write or prepare
//! on a prepared transaction, or a timestamp-rule violation raises the
//! dedicated abort condition (`ErrorCode::Panic`) — the model's rendition of
//! the engine aborting the process.
//!
//! ## Write Conflicts
//!
//! Writes never conflict at write time: any number of active transactions may
//! hold a pending update on one key. The conflict is resolved at commit,
//! under the database's commit serialization lock: if another transaction
//! committed one of this transaction's keys after this transaction began
//! (`commit_seq > begin_seq`), the commit rolls the transaction back and
//! fails with `ROLLBACK`. First committer wins.
//!
//! ## Write Set
//!
//! Transactions track their writes as `(table name, key)` pairs in a
//! `SmallVec<[WriteRef; 16]>`; most transactions touch few keys and stay on
//! the stack. Table names resolve through the database at transition time —
//! no owning back-pointers.
//!
//! ## Drop Behavior
//!
//! Dropping an unresolved transaction rolls it back, so an early `?` return
//! in caller code cannot leak pending updates into key histories.

use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::config::parse_txn_config;
use super::database::Database;
use super::timestamp::{Timestamp, TxnId, TS_NONE};
use crate::error::ErrorCode;
use crate::{bail_code, ensure_code};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    #[default]
    Active,
    Prepared,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WriteRef {
    pub table: String,
    pub key: Arc<[u8]>,
}

pub(crate) struct TxnInner {
    pub state: TxnState,
    pub prepare_ts: Timestamp,
    /// Commit/durable timestamps staged by `timestamp_transaction`.
    pub commit_ts: Timestamp,
    pub durable_ts: Timestamp,
    pub writes: SmallVec<[WriteRef; 16]>,
}

/// Transaction state shared with readers that only need the id, snapshot,
/// and lifecycle state — the cursor walk checks for cooperative abort
/// through this handle.
pub(crate) struct TxnShared {
    pub id: TxnId,
    pub read_ts: Timestamp,
    pub begin_seq: u64,
    pub inner: Mutex<TxnInner>,
}

impl TxnShared {
    pub fn state(&self) -> TxnState {
        self.inner.lock().state
    }
}

pub struct Transaction {
    db: Database,
    shared: Arc<TxnShared>,
    resolved: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(db: Database, shared: Arc<TxnShared>) -> Self {
        Self {
            db,
            shared,
            resolved: false,
        }
    }

    pub fn id(&self) -> TxnId {
        self.shared.id
    }

    /// The transaction's read timestamp; `TS_LATEST` when none was given.
    pub fn read_ts(&self) -> Timestamp {
        self.shared.read_ts
    }

    pub fn state(&self) -> TxnState {
        self.shared.state()
    }

    pub(crate) fn shared_handle(&self) -> Arc<TxnShared> {
        Arc::clone(&self.shared)
    }

    /// Stages commit, durable, or prepare timestamps from a configuration
    /// string; `prepare()` and `commit()` consume them.
    pub fn timestamp_transaction(&mut self, config: &str) -> Result<()> {
        let cfg = parse_txn_config(config)?;
        ensure_code!(
            cfg.read_ts.is_none() && cfg.stable_ts.is_none(),
            ErrorCode::InvalidArgument,
            "only commit, durable, and prepare timestamps may be set on a transaction"
        );

        let mut inner = self.shared.inner.lock();
        match inner.state {
            TxnState::Active => {}
            TxnState::Prepared => {
                ensure_code!(
                    cfg.prepare_ts.is_none(),
                    ErrorCode::Panic,
                    "transaction is already prepared"
                );
            }
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }
        if let Some(ts) = cfg.commit_ts {
            inner.commit_ts = ts;
        }
        if let Some(ts) = cfg.durable_ts {
            inner.durable_ts = ts;
        }
        if let Some(ts) = cfg.prepare_ts {
            inner.prepare_ts = ts;
        }
        Ok(())
    }

    /// Prepares the transaction with the staged prepare timestamp.
    pub fn prepare(&mut self) -> Result<()> {
        let staged = self.shared.inner.lock().prepare_ts;
        ensure_code!(
            staged != TS_NONE,
            ErrorCode::Panic,
            "prepare requires a prepare timestamp"
        );
        self.prepare_at(staged)
    }

    /// Prepares the transaction at `prepare_ts`, reserving its writes while
    /// deferring visibility.
    pub fn prepare_at(&mut self, prepare_ts: Timestamp) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            TxnState::Active => {}
            TxnState::Prepared => {
                bail_code!(ErrorCode::Panic, "transaction is already prepared")
            }
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }

        let stable = self.db.stable_timestamp();
        ensure_code!(
            prepare_ts > stable,
            ErrorCode::Panic,
            "prepare timestamp {prepare_ts} must be later than the stable timestamp {stable}"
        );

        inner.state = TxnState::Prepared;
        inner.prepare_ts = prepare_ts;
        for write in &inner.writes {
            if let Ok(table) = self.db.open_table(&write.table) {
                table.prepare_update(&write.key, self.shared.id, prepare_ts);
            }
        }
        Ok(())
    }

    /// Commits with the staged commit/durable timestamps, or without
    /// timestamps when none were staged.
    pub fn commit(&mut self) -> Result<()> {
        let (commit_ts, durable_ts) = {
            let inner = self.shared.inner.lock();
            (nonzero(inner.commit_ts), nonzero(inner.durable_ts))
        };
        self.commit_impl(commit_ts, durable_ts)
    }

    /// Commits at `commit_ts` with an optional distinct durable timestamp.
    pub fn commit_at(
        &mut self,
        commit_ts: Timestamp,
        durable_ts: Option<Timestamp>,
    ) -> Result<()> {
        self.commit_impl(Some(commit_ts), durable_ts)
    }

    fn commit_impl(
        &mut self,
        commit_ts: Option<Timestamp>,
        durable_ts: Option<Timestamp>,
    ) -> Result<()> {
        let _serial = self.db.commit_lock();
        let mut inner = self.shared.inner.lock();

        match inner.state {
            TxnState::Active | TxnState::Prepared => {}
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }

        if inner.state == TxnState::Prepared {
            let Some(cts) = commit_ts else {
                bail_code!(
                    ErrorCode::Panic,
                    "commit timestamp is required for a prepared transaction"
                );
            };
            ensure_code!(
                cts >= inner.prepare_ts,
                ErrorCode::Panic,
                "commit timestamp {cts} is earlier than the prepare timestamp {}",
                inner.prepare_ts
            );
            let stable = self.db.stable_timestamp();
            ensure_code!(
                cts >= stable,
                ErrorCode::Panic,
                "commit timestamp {cts} is earlier than the stable timestamp {stable}"
            );
        }

        let durable = match (commit_ts, durable_ts) {
            (Some(cts), Some(dts)) => {
                ensure_code!(
                    dts >= cts,
                    ErrorCode::Panic,
                    "durable timestamp {dts} is earlier than the commit timestamp {cts}"
                );
                dts
            }
            (Some(cts), None) => cts,
            (None, Some(_)) => bail_code!(
                ErrorCode::Panic,
                "a durable timestamp requires a commit timestamp"
            ),
            (None, None) => TS_NONE,
        };
        let commit = commit_ts.unwrap_or(TS_NONE);

        // First committer wins: another transaction committing any of our
        // keys after we began rolls us back.
        let conflict = inner.writes.iter().any(|write| {
            self.db.open_table(&write.table).is_ok_and(|table| {
                table.has_commit_conflict(&write.key, self.shared.id, self.shared.begin_seq)
            })
        });
        if conflict {
            for write in &inner.writes {
                if let Ok(table) = self.db.open_table(&write.table) {
                    table.abort_update(&write.key, self.shared.id);
                }
            }
            inner.state = TxnState::Aborted;
            drop(inner);
            drop(_serial);
            self.finish();
            bail_code!(
                ErrorCode::Rollback,
                "conflict between concurrent operations"
            );
        }

        let commit_seq = self.db.next_commit_seq();
        for write in &inner.writes {
            if let Ok(table) = self.db.open_table(&write.table) {
                table.commit_update(&write.key, self.shared.id, commit, durable, commit_seq);
            }
        }
        inner.state = TxnState::Committed;
        inner.commit_ts = commit;
        inner.durable_ts = durable;
        drop(inner);
        drop(_serial);
        self.finish();
        Ok(())
    }

    /// Rolls the transaction back, aborting its updates.
    pub fn rollback(&mut self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            TxnState::Active | TxnState::Prepared => {}
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }

        for write in &inner.writes {
            if let Ok(table) = self.db.open_table(&write.table) {
                table.abort_update(&write.key, self.shared.id);
            }
        }
        inner.state = TxnState::Aborted;
        drop(inner);
        self.finish();
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        match self.shared.state() {
            TxnState::Active => Ok(()),
            TxnState::Prepared => bail_code!(
                ErrorCode::Panic,
                "cannot write in a prepared transaction"
            ),
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }
    }

    pub(crate) fn check_readable(&self) -> Result<()> {
        match self.shared.state() {
            TxnState::Active => Ok(()),
            TxnState::Prepared => bail_code!(
                ErrorCode::Panic,
                "cannot read in a prepared transaction"
            ),
            _ => bail_code!(
                ErrorCode::Panic,
                "transaction is already committed or rolled back"
            ),
        }
    }

    pub(crate) fn record_write(&self, table: &str, key: &[u8]) {
        let mut inner = self.shared.inner.lock();
        let seen = inner
            .writes
            .iter()
            .any(|w| w.table == table && w.key.as_ref() == key);
        if !seen {
            inner.writes.push(WriteRef {
                table: table.to_string(),
                key: Arc::from(key),
            });
        }
    }

    fn finish(&mut self) {
        self.resolved = true;
        self.db.forget_transaction(self.shared.id);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.resolved {
            let _ = self.rollback();
        }
    }
}

fn nonzero(ts: Timestamp) -> Option<Timestamp> {
    (ts != TS_NONE).then_some(ts)
}
