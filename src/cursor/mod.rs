//! # Cursors
//!
//! Cursors are polymorphic over many kinds; the visible slice carries two of
//! them as a tagged union with a fixed capability set:
//!
//! | capability    | Btree | Block |
//! |---------------|-------|-------|
//! | `next`/`prev` |  yes  |   —   |
//! | `next_raw_n`  |   —   |  yes  |
//! | `prev_raw_n`  |   —   |  yes  |
//! | `search`      |   —   |   —   |
//! | `insert`      |   —   |   —   |
//! | `remove`      |   —   |   —   |
//! | `update`      |   —   |   —   |
//! | `reset`/`close` | yes |  yes  |
//!
//! A capability a variant does not implement fails with
//! `INVALID_ARGUMENT`; the point-operation cursor kinds live outside this
//! crate.
//!
//! ## Checkpoint Scope
//!
//! [`open_block`] builds a block cursor whose walk observes the session's
//! bound checkpoint when there is one, the enclosing transaction otherwise,
//! and the latest committed data failing both.

mod block;
mod walk;

pub use block::{BlockCursor, KeyBuf};
pub use walk::{ReadScope, TableWalk, TreeWalk};

use std::sync::Arc;

use eyre::Result;

use crate::bail_code;
use crate::error::ErrorCode;
use crate::mvcc::{Table, Transaction};
use crate::session::Session;
use crate::storage::Buf;

/// Single-row cursor over a tree walk.
pub struct BtreeCursor<W: TreeWalk> {
    walk: W,
    value: Buf,
}

impl<W: TreeWalk> BtreeCursor<W> {
    pub fn new(walk: W) -> Self {
        Self {
            walk,
            value: Buf::new(),
        }
    }

    pub fn next(&mut self) -> Result<()> {
        self.walk.next(&mut self.value)
    }

    pub fn prev(&mut self) -> Result<()> {
        self.walk.prev(&mut self.value)
    }

    pub fn key(&self) -> &[u8] {
        self.walk.key()
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_slice()
    }

    pub fn reset(&mut self) {
        self.walk.reset();
        self.value.clear();
    }
}

/// The cursor family as a tagged union.
pub enum Cursor<W: TreeWalk> {
    Btree(BtreeCursor<W>),
    Block(BlockCursor<W>),
}

impl<W: TreeWalk> Cursor<W> {
    pub fn next(&mut self) -> Result<()> {
        match self {
            Cursor::Btree(cursor) => cursor.next(),
            Cursor::Block(_) => unsupported("next"),
        }
    }

    pub fn prev(&mut self) -> Result<()> {
        match self {
            Cursor::Btree(cursor) => cursor.prev(),
            Cursor::Block(_) => unsupported("prev"),
        }
    }

    pub fn next_raw_n(&mut self) -> Result<(&[KeyBuf], &[Buf], usize)> {
        match self {
            Cursor::Block(cursor) => cursor.next_raw_n(),
            Cursor::Btree(_) => unsupported("next_raw_n"),
        }
    }

    pub fn prev_raw_n(&mut self) -> Result<(&[KeyBuf], &[Buf], usize)> {
        match self {
            Cursor::Block(cursor) => cursor.prev_raw_n(),
            Cursor::Btree(_) => unsupported("prev_raw_n"),
        }
    }

    pub fn search(&mut self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        unsupported("search")
    }

    pub fn insert(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        unsupported("insert")
    }

    pub fn remove(&mut self, _key: &[u8]) -> Result<()> {
        unsupported("remove")
    }

    pub fn update(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        unsupported("update")
    }

    pub fn reset(&mut self) {
        match self {
            Cursor::Btree(cursor) => cursor.reset(),
            Cursor::Block(cursor) => cursor.reset(),
        }
    }

    pub fn close(mut self) {
        self.reset();
    }
}

fn unsupported<T>(operation: &str) -> Result<T> {
    bail_code!(
        ErrorCode::InvalidArgument,
        "cursor does not support {operation}"
    );
}

/// Opens a block cursor on a table under the session's read scope.
pub fn open_block(
    table: &Arc<Table>,
    session: &Session,
    txn: Option<&Transaction>,
) -> Result<Cursor<TableWalk>> {
    let scope = ReadScope::from_session(session, txn);
    let walk = TableWalk::new(Arc::clone(table), scope);
    Ok(Cursor::Block(BlockCursor::new(table.config(), walk)?))
}

/// Opens a single-row cursor on a table under the session's read scope.
pub fn open_btree(
    table: &Arc<Table>,
    session: &Session,
    txn: Option<&Transaction>,
) -> Cursor<TableWalk> {
    let scope = ReadScope::from_session(session, txn);
    Cursor::Btree(BtreeCursor::new(TableWalk::new(Arc::clone(table), scope)))
}
