//! # Transactional KV Model (MVCC)
//!
//! This module is the semantic reference for the engine's multi-version
//! concurrency control: timestamped commits, prepared transactions, named and
//! unnamed checkpoints, and snapshot reads. It defines the truth of what a
//! reader at time `t` or at checkpoint `K` must see; the on-disk engine must
//! agree with it on every visible behavior.
//!
//! ## Timestamps
//!
//! Five timestamps drive visibility, all caller-assigned:
//!
//! - `read_ts` (per transaction): the snapshot a reader observes; absent
//!   means "latest committed".
//! - `prepare_ts`: reserves a transaction's writes while deferring their
//!   visibility; must be later than the stable timestamp.
//! - `commit_ts`: when the writes become visible; for a prepared transaction
//!   it must be at or after the prepare timestamp and at or after the stable
//!   timestamp.
//! - `durable_ts`: when the writes are considered persisted; never earlier
//!   than the commit timestamp, and the bound checkpoints use for prepared
//!   transactions.
//! - `stable_ts` (database-global): monotonic once set; the checkpoint bound.
//!
//! ## Visibility Rules
//!
//! A reader at `read_ts = t` sees the committed update with the greatest
//! `commit_ts <= t`; a reader with no timestamp sees the greatest committed
//! update. Readers inside a transaction additionally see that transaction's
//! own pending writes. A prepared update from another transaction that would
//! be the visible candidate fails the read with `PREPARE_CONFLICT` instead
//! of exposing the prior value.
//!
//! ## Checkpoints
//!
//! Checkpoints materialize their visible set at creation and never mutate.
//! A checkpoint created before any stable timestamp was set captures all
//! committed data; afterwards it is bounded by the stable timestamp on both
//! commit and durable timestamps.
//!
//! ## Concurrency Model
//!
//! - Table row maps: `RwLock`, readers never block readers.
//! - Commit order: one database-level mutex serializes commits and
//!   checkpoint creation and hands out the strictly-ordered commit sequence.
//! - Stable timestamp: lock-free `fetch_max`.
//! - Checkpoints: immutable behind `Arc`, shareable without locks.
//!
//! ## Key Structures
//!
//! - [`Timestamp`] / [`TxnId`]: 64-bit logical clocks and identifiers
//! - [`Update`]: one version of one key, moving `Pending → Prepared? →
//!   Committed | Aborted`
//! - [`Table`]: key → history map, lexicographic on key bytes
//! - [`Transaction`]: the state machine over a write set
//! - [`Checkpoint`]: immutable named/unnamed snapshot
//! - [`Database`]: catalog, stable timestamp, commit clock, registries

pub mod checkpoint;
pub mod config;
pub mod database;
pub mod table;
pub mod timestamp;
pub mod transaction;
pub mod update;

pub use checkpoint::Checkpoint;
pub use config::{parse_checkpoint_config, parse_txn_config, CheckpointConfig, TxnConfig};
pub use database::Database;
pub use table::{Table, TableConfig, TableType, RAW_FORMAT};
pub use timestamp::{parse_timestamp, Timestamp, TxnId, TS_LATEST, TS_NONE};
pub use transaction::{Transaction, TxnState};
pub use update::{Update, UpdateState};
