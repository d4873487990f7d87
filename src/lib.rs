//! # BurrowDB Core — Embedded Transactional Storage Engine
//!
//! BurrowDB's core is the heart of an embedded transactional row-store
//! engine: a B-tree-backed key/value store with MVCC, snapshot and
//! checkpoint isolation, prepared transactions, and checksummed block
//! storage. This crate carries the four hardest subsystems; the on-disk
//! B-tree page format, the write path and reconciliation, logging and
//! recovery, and the outer API surface live in the surrounding engine and
//! appear here only as named interfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          Session (flags, ckpt scope)         │
//! ├───────────────────────┬──────────────────────┤
//! │  MVCC Model (mvcc)    │  Block Cursor        │
//! │  txns, timestamps,    │  (cursor)            │
//! │  checkpoints          │  batch iteration     │
//! ├───────────────────────┴──────────────────────┤
//! │      Block Manager read path (storage)       │
//! │      cookies, checksums, chunk cache         │
//! ├──────────────────────────────────────────────┤
//! │      Region Page Allocator (memory)          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - [`mvcc`]: the transactional KV reference model — the semantic truth of
//!   what a reader at time `t` or at checkpoint `K` must see.
//! - [`storage`]: address-cookie decoding, verified reads, corruption
//!   handling.
//! - [`memory`]: region-backed page slots and per-page spill allocations.
//! - [`cursor`]: bounded batch iteration over a row store within a
//!   checkpoint scope.
//!
//! ## Quick Start
//!
//! ```ignore
//! use burrowdb::{Database, Session};
//!
//! let db = Database::new();
//! let table = db.create_table("table")?;
//!
//! let mut txn = db.begin_transaction()?;
//! table.insert(&txn, b"Key 1", b"Value 1")?;
//! txn.commit_at(10, None)?;
//!
//! db.set_stable_timestamp(15);
//! let ckpt = db.create_checkpoint(Some("ckpt1"))?;
//! assert_eq!(table.get_checkpoint(&ckpt, b"Key 1", None)?,
//!            Some(b"Value 1".to_vec()));
//! ```
//!
//! ## Error Model
//!
//! Everything fallible returns `eyre::Result`; the codes callers can act on
//! (`NOT_FOUND`, `ROLLBACK`, `PREPARE_CONFLICT`, `DUPLICATE_KEY`,
//! `INVALID_ARGUMENT`, `IO_ERROR`, `CORRUPTION`, `PANIC`) travel as
//! [`error::ErrorCode`] inside the report and are recovered with
//! `ErrorCode::of`.

#[macro_use]
mod macros;

pub mod config;
pub mod cursor;
pub mod error;
pub mod memory;
pub mod mvcc;
pub mod session;
pub mod storage;

pub use cursor::{open_block, open_btree, BlockCursor, Cursor, ReadScope, TableWalk, TreeWalk};
pub use error::ErrorCode;
pub use memory::{PageAllocator, PageHandle, SpillHandle};
pub use mvcc::{Checkpoint, Database, Table, TableConfig, TableType, Timestamp, Transaction};
pub use session::Session;
pub use storage::{Block, BlockAddr, BlockManager, Buf, CorruptionLatch, MemChunkCache};
