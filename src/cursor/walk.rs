//! # Tree Walks
//!
//! The block cursor fills its batches through the [`TreeWalk`] trait, the
//! seam to the B-tree iteration machinery that lives outside this crate. A
//! walk positions itself on one row at a time; each advance records the value
//! directly into the caller's buffer and exposes the current key, together
//! with a per-step flag saying whether the key must be copied out before the
//! next advance invalidates it.
//!
//! Two advance families exist per direction: `next`/`prev` cross page
//! boundaries, `next_on_page`/`prev_on_page` are the intra-page fast path
//! and report `NOT_FOUND` at the page edge.
//!
//! ## Reference Implementation
//!
//! [`TableWalk`] implements the trait over a model table so the cursor and
//! the transactional model integrate end to end. It emulates leaf boundaries
//! with a fixed row width per page, observes the scope's visibility rules
//! (latest, timestamped, in-transaction, or a bound checkpoint), surfaces
//! `PREPARE_CONFLICT` from visibility scans, and honors cooperative abort:
//! a walk inside a transaction that has been rolled back fails with
//! `ROLLBACK` and resets its position.

use std::sync::Arc;

use eyre::Result;

use crate::bail_code;
use crate::config::WALK_ROWS_PER_PAGE;
use crate::error::ErrorCode;
use crate::mvcc::checkpoint::Checkpoint;
use crate::mvcc::table::Table;
use crate::mvcc::timestamp::{Timestamp, TS_LATEST};
use crate::mvcc::transaction::{Transaction, TxnShared, TxnState};
use crate::session::Session;
use crate::storage::Buf;

/// Forward/reverse row iteration over a tree, one row per advance.
pub trait TreeWalk {
    /// Advances forward, crossing page boundaries.
    fn next(&mut self, value: &mut Buf) -> Result<()>;

    /// Advances forward within the current page; `NOT_FOUND` at the edge.
    fn next_on_page(&mut self, value: &mut Buf) -> Result<()>;

    /// Advances backward, crossing page boundaries.
    fn prev(&mut self, value: &mut Buf) -> Result<()>;

    /// Advances backward within the current page; `NOT_FOUND` at the edge.
    fn prev_on_page(&mut self, value: &mut Buf) -> Result<()>;

    /// Key at the current position; valid until the next advance.
    fn key(&self) -> &[u8];

    /// True when the current key must be copied into cursor storage before
    /// the next advance.
    fn key_copy_required(&self) -> bool;

    /// Stable refcounted key at the current position, when the walk can
    /// offer one; the cursor retains it instead of copying.
    fn key_shared(&self) -> Option<Arc<[u8]>>;

    /// Abandons the position.
    fn reset(&mut self);
}

/// What a walk is allowed to see.
pub struct ReadScope {
    kind: ScopeKind,
}

enum ScopeKind {
    Latest,
    Timestamp(Timestamp),
    Txn(Arc<TxnShared>),
    Checkpoint {
        checkpoint: Arc<Checkpoint>,
        read_ts: Option<Timestamp>,
    },
}

impl ReadScope {
    /// Latest committed data.
    pub fn latest() -> Self {
        Self {
            kind: ScopeKind::Latest,
        }
    }

    /// Committed data as of `read_ts`.
    pub fn at(read_ts: Timestamp) -> Self {
        Self {
            kind: ScopeKind::Timestamp(read_ts),
        }
    }

    /// The transaction's snapshot, including its own writes.
    pub fn transaction(txn: &Transaction) -> Self {
        Self {
            kind: ScopeKind::Txn(txn.shared_handle()),
        }
    }

    /// A checkpoint's captured snapshot, optionally bounded by a debug read
    /// timestamp.
    pub fn checkpoint(checkpoint: Arc<Checkpoint>, read_ts: Option<Timestamp>) -> Self {
        Self {
            kind: ScopeKind::Checkpoint {
                checkpoint,
                read_ts,
            },
        }
    }

    /// The scope a cursor opened from this session observes: the bound
    /// checkpoint when there is one, else the enclosing transaction, else
    /// the latest committed data.
    pub fn from_session(session: &Session, txn: Option<&Transaction>) -> Self {
        if let Some((checkpoint, read_ts)) = session.checkpoint_binding() {
            return Self::checkpoint(Arc::clone(checkpoint), read_ts);
        }
        match txn {
            Some(txn) => Self::transaction(txn),
            None => Self::latest(),
        }
    }
}

/// [`TreeWalk`] over a model table, with emulated leaf boundaries.
pub struct TableWalk {
    table: Arc<Table>,
    scope: ReadScope,
    rows_per_page: usize,
    pos: Option<Arc<[u8]>>,
    page_used: usize,
}

impl TableWalk {
    pub fn new(table: Arc<Table>, scope: ReadScope) -> Self {
        Self {
            table,
            scope,
            rows_per_page: WALK_ROWS_PER_PAGE,
            pos: None,
            page_used: 0,
        }
    }

    /// Overrides the emulated leaf width.
    pub fn with_rows_per_page(mut self, rows: usize) -> Self {
        self.rows_per_page = rows.max(1);
        self
    }

    fn advance(&mut self, forward: bool, on_page: bool, value: &mut Buf) -> Result<()> {
        let txn_resolved = matches!(&self.scope.kind, ScopeKind::Txn(shared)
            if matches!(shared.state(), TxnState::Committed | TxnState::Aborted));
        if txn_resolved {
            self.reset();
            bail_code!(
                ErrorCode::Rollback,
                "enclosing transaction resolved during walk"
            );
        }

        if on_page && self.page_used >= self.rows_per_page {
            bail_code!(ErrorCode::NotFound, "end of page");
        }

        let pos = self.pos.as_deref();
        let found = match &self.scope.kind {
            ScopeKind::Latest => self.step_table(pos, forward, TS_LATEST, None)?,
            ScopeKind::Timestamp(ts) => self.step_table(pos, forward, *ts, None)?,
            ScopeKind::Txn(shared) => {
                self.step_table(pos, forward, shared.read_ts, Some(shared.id))?
            }
            ScopeKind::Checkpoint {
                checkpoint,
                read_ts,
            } => match checkpoint.table(self.table.name()) {
                Some(table) => {
                    if forward {
                        table.next_visible(pos, *read_ts)
                    } else {
                        table.prev_visible(pos, *read_ts)
                    }
                }
                None => None,
            },
        };

        let Some((key, row)) = found else {
            bail_code!(ErrorCode::NotFound, "cursor exhausted");
        };

        value.set(&row);
        self.pos = Some(key);
        self.page_used = if on_page { self.page_used + 1 } else { 1 };
        Ok(())
    }

    fn step_table(
        &self,
        pos: Option<&[u8]>,
        forward: bool,
        read_ts: Timestamp,
        own: Option<u64>,
    ) -> Result<Option<(Arc<[u8]>, Vec<u8>)>> {
        if forward {
            self.table.walk_next(pos, read_ts, own)
        } else {
            self.table.walk_prev(pos, read_ts, own)
        }
    }
}

impl TreeWalk for TableWalk {
    fn next(&mut self, value: &mut Buf) -> Result<()> {
        self.advance(true, false, value)
    }

    fn next_on_page(&mut self, value: &mut Buf) -> Result<()> {
        self.advance(true, true, value)
    }

    fn prev(&mut self, value: &mut Buf) -> Result<()> {
        self.advance(false, false, value)
    }

    fn prev_on_page(&mut self, value: &mut Buf) -> Result<()> {
        self.advance(false, true, value)
    }

    fn key(&self) -> &[u8] {
        self.pos.as_deref().unwrap_or(&[])
    }

    fn key_copy_required(&self) -> bool {
        // Keys are Arc-shared with the table; they stay valid for the batch.
        false
    }

    fn key_shared(&self) -> Option<Arc<[u8]>> {
        self.pos.clone()
    }

    fn reset(&mut self) {
        self.pos = None;
        self.page_used = 0;
    }
}
