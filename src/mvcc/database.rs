//! # Database
//!
//! The database handle ties the model together: the table catalog, the
//! global stable timestamp, the commit serialization point, the checkpoint
//! registry, and the active-transaction registry.
//!
//! ## Memory Layout
//!
//! ```text
//! Database (cheaply cloneable)
//!   └── Arc<DbInner>
//!         ├── tables:      RwLock<HashMap<String, Arc<Table>>>
//!         ├── stable_ts:   AtomicU64        fetch_max; TS_NONE = never set
//!         ├── next_txn_id: AtomicU64
//!         ├── commit_seq:  AtomicU64        bumped under commit_lock only
//!         ├── commit_lock: Mutex<()>        commit / checkpoint serialization
//!         ├── checkpoints: Mutex<CheckpointRegistry>
//!         └── active:      Mutex<HashMap<TxnId, Arc<TxnShared>>>
//! ```
//!
//! ## Stable Timestamp
//!
//! `set_stable_timestamp` is an atomic `fetch_max`: advancement is a
//! monotonic release observable by all subsequent checkpoint creations and
//! timestamped reads, and attempts to move it backwards are silently
//! ignored.
//!
//! ## Commit Serialization
//!
//! Commits and checkpoint creation share one mutex. A commit checks for
//! write-write conflicts, takes the next commit sequence number, and applies
//! its transitions without any other commit interleaving; a checkpoint
//! captures table state without a commit landing halfway through its scan.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eyre::Result;
use parking_lot::{Mutex, MutexGuard, RwLock};
use smallvec::SmallVec;

use super::checkpoint::{Checkpoint, CheckpointTable};
use super::config::{parse_checkpoint_config, parse_txn_config};
use super::table::{Table, TableConfig};
use super::timestamp::{Timestamp, TxnId, TS_LATEST, TS_NONE};
use super::transaction::{Transaction, TxnInner, TxnShared, TxnState};
use crate::error::ErrorCode;
use crate::{bail_code, ensure_code};

#[derive(Default)]
struct CheckpointRegistry {
    named: HashMap<String, Arc<Checkpoint>>,
    unnamed: Option<Arc<Checkpoint>>,
}

struct DbInner {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    stable_ts: AtomicU64,
    next_txn_id: AtomicU64,
    commit_seq: AtomicU64,
    commit_lock: Mutex<()>,
    checkpoints: Mutex<CheckpointRegistry>,
    active: Mutex<HashMap<TxnId, Arc<TxnShared>>>,
}

pub struct Database {
    inner: Arc<DbInner>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DbInner {
                tables: RwLock::new(HashMap::new()),
                stable_ts: AtomicU64::new(TS_NONE),
                next_txn_id: AtomicU64::new(1),
                commit_seq: AtomicU64::new(0),
                commit_lock: Mutex::new(()),
                checkpoints: Mutex::new(CheckpointRegistry::default()),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a row-store table with raw key/value formats.
    pub fn create_table(&self, name: &str) -> Result<Arc<Table>> {
        self.create_table_with_config(name, TableConfig::default())
    }

    pub fn create_table_with_config(
        &self,
        name: &str,
        config: TableConfig,
    ) -> Result<Arc<Table>> {
        ensure_code!(
            !name.is_empty(),
            ErrorCode::InvalidArgument,
            "table name must not be empty"
        );
        let mut tables = self.inner.tables.write();
        ensure_code!(
            !tables.contains_key(name),
            ErrorCode::DuplicateKey,
            "table {name:?} already exists"
        );
        let table = Arc::new(Table::new(name, config));
        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    pub fn open_table(&self, name: &str) -> Result<Arc<Table>> {
        match self.inner.tables.read().get(name) {
            Some(table) => Ok(Arc::clone(table)),
            None => bail_code!(ErrorCode::NotFound, "no table named {name:?}"),
        }
    }

    /// Begins a transaction reading the latest committed data.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        self.begin_transaction_with_config(None)
    }

    /// Begins a transaction; `read_timestamp=<hex>` pins its snapshot.
    pub fn begin_transaction_with_config(
        &self,
        config: Option<&str>,
    ) -> Result<Transaction> {
        let cfg = config.map(parse_txn_config).transpose()?.unwrap_or_default();
        ensure_code!(
            cfg.commit_ts.is_none()
                && cfg.durable_ts.is_none()
                && cfg.prepare_ts.is_none()
                && cfg.stable_ts.is_none(),
            ErrorCode::InvalidArgument,
            "only read_timestamp may be configured at transaction begin"
        );

        let id = self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(TxnShared {
            id,
            read_ts: cfg.read_ts.unwrap_or(TS_LATEST),
            begin_seq: self.inner.commit_seq.load(Ordering::Acquire),
            inner: Mutex::new(TxnInner {
                state: TxnState::Active,
                prepare_ts: TS_NONE,
                commit_ts: TS_NONE,
                durable_ts: TS_NONE,
                writes: SmallVec::new(),
            }),
        });
        self.inner.active.lock().insert(id, Arc::clone(&shared));
        Ok(Transaction::new(self.clone(), shared))
    }

    /// Advances the stable timestamp; attempts to move it backwards are
    /// silently ignored.
    pub fn set_stable_timestamp(&self, ts: Timestamp) {
        self.inner.stable_ts.fetch_max(ts, Ordering::AcqRel);
    }

    /// The current stable timestamp; `TS_NONE` when never set.
    pub fn stable_timestamp(&self) -> Timestamp {
        self.inner.stable_ts.load(Ordering::Acquire)
    }

    pub(crate) fn stable_timestamp_opt(&self) -> Option<Timestamp> {
        match self.stable_timestamp() {
            TS_NONE => None,
            ts => Some(ts),
        }
    }

    /// Applies database-level timestamps from a configuration string;
    /// `stable_timestamp=<hex>` is the one this model carries.
    pub fn set_timestamp(&self, config: &str) -> Result<()> {
        let cfg = parse_txn_config(config)?;
        ensure_code!(
            cfg.read_ts.is_none()
                && cfg.commit_ts.is_none()
                && cfg.durable_ts.is_none()
                && cfg.prepare_ts.is_none(),
            ErrorCode::InvalidArgument,
            "only stable_timestamp may be set on the database"
        );
        if let Some(ts) = cfg.stable_ts {
            self.set_stable_timestamp(ts);
        }
        Ok(())
    }

    /// Creates a checkpoint: a named one, or the unnamed checkpoint that
    /// replaces its predecessor. The visible set is fixed here and never
    /// mutates.
    pub fn create_checkpoint(&self, name: Option<&str>) -> Result<Arc<Checkpoint>> {
        if let Some(name) = name {
            ensure_code!(
                !name.is_empty(),
                ErrorCode::InvalidArgument,
                "checkpoint name must not be empty"
            );
        }

        // Serialize against commits so the capture is a consistent cut.
        let _serial = self.inner.commit_lock.lock();
        let stable_ts = self.stable_timestamp_opt();

        let mut captured: HashMap<String, CheckpointTable> = HashMap::new();
        for (table_name, table) in self.inner.tables.read().iter() {
            captured.insert(table_name.clone(), table.capture_checkpoint(stable_ts));
        }

        let checkpoint = Arc::new(Checkpoint::new(
            name.map(String::from),
            stable_ts,
            captured,
        ));

        let mut registry = self.inner.checkpoints.lock();
        match name {
            Some(name) => {
                registry
                    .named
                    .insert(name.to_string(), Arc::clone(&checkpoint));
            }
            None => registry.unnamed = Some(Arc::clone(&checkpoint)),
        }
        Ok(checkpoint)
    }

    /// Looks up a checkpoint; `None` selects the most recent unnamed one.
    pub fn checkpoint(&self, name: Option<&str>) -> Result<Arc<Checkpoint>> {
        let registry = self.inner.checkpoints.lock();
        let found = match name {
            Some(name) => registry.named.get(name).cloned(),
            None => registry.unnamed.clone(),
        };
        match found {
            Some(checkpoint) => Ok(checkpoint),
            None => bail_code!(
                ErrorCode::NotFound,
                "no checkpoint named {:?}",
                name.unwrap_or("(unnamed)")
            ),
        }
    }

    /// Resolves a `checkpoint=<name>[,debug=(checkpoint_read_timestamp=..)]`
    /// configuration string to the checkpoint and the optional debug read
    /// timestamp overlay.
    pub fn open_checkpoint(
        &self,
        config: &str,
    ) -> Result<(Arc<Checkpoint>, Option<Timestamp>)> {
        let cfg = parse_checkpoint_config(config)?;
        let checkpoint = self.checkpoint(cfg.name.as_deref())?;
        Ok((checkpoint, cfg.debug_read_ts))
    }

    pub fn active_transaction_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    pub(crate) fn commit_lock(&self) -> MutexGuard<'_, ()> {
        self.inner.commit_lock.lock()
    }

    pub(crate) fn next_commit_seq(&self) -> u64 {
        self.inner.commit_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn forget_transaction(&self, id: TxnId) {
        self.inner.active.lock().remove(&id);
    }
}
