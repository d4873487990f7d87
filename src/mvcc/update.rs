//! # Updates
//!
//! An update is one version of one key: the value (or a tombstone) written by
//! one transaction, stamped with the transaction's timestamps as it moves
//! through the lifecycle.
//!
//! ```text
//! Pending ──prepare()──> Prepared ──commit()──> Committed
//!    │                      │
//!    │                      └──rollback()──> Aborted
//!    └───────rollback()───────────────────────> Aborted
//!    └───────commit()───────> Committed
//! ```
//!
//! Committed and Aborted are terminal: an update never changes after entering
//! either state. Aborted updates stay in the key history (readers skip them);
//! individual removal is a history-pruning concern outside this model.

use super::timestamp::{Timestamp, TxnId, TS_NONE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Pending,
    Prepared,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub txn_id: TxnId,
    pub state: UpdateState,
    pub prepare_ts: Timestamp,
    pub commit_ts: Timestamp,
    pub durable_ts: Timestamp,
    /// Commit serialization order; totally orders committed updates.
    pub commit_seq: u64,
    /// `None` is a tombstone.
    pub value: Option<Vec<u8>>,
}

impl Update {
    pub fn pending(txn_id: TxnId, value: Option<Vec<u8>>) -> Self {
        Self {
            txn_id,
            state: UpdateState::Pending,
            prepare_ts: TS_NONE,
            commit_ts: TS_NONE,
            durable_ts: TS_NONE,
            commit_seq: 0,
            value,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, UpdateState::Committed | UpdateState::Aborted)
    }

    /// True for a committed update a reader at `read_ts` may see. Updates
    /// committed without a timestamp are visible at every read timestamp.
    pub fn committed_visible_at(&self, read_ts: Timestamp) -> bool {
        self.state == UpdateState::Committed
            && (self.commit_ts == TS_NONE || self.commit_ts <= read_ts)
    }
}
