//! # Checkpoints
//!
//! A checkpoint is an immutable, logically consistent snapshot of the
//! database, materialized at creation under the commit lock. What it captures
//! depends on the stable timestamp at that moment:
//!
//! - Stable timestamp set to `S`: committed updates with `commit_ts <= S` and
//!   `durable_ts <= S`. The durable bound is what keeps a prepared-then-
//!   committed update whose durability lags the stable timestamp out of the
//!   checkpoint, exposing the prior committed value instead.
//! - Stable timestamp never set: every committed update, with no bound.
//!
//! Named checkpoints are addressable by name; an unnamed checkpoint replaces
//! the previous unnamed one. Checkpoints are immutable after creation and
//! freely shareable across threads without synchronization.
//!
//! Checkpoint reads accept an optional debug read timestamp overlaid on the
//! checkpoint: an additional upper bound on commit timestamps within the
//! captured set.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;

use super::timestamp::{Timestamp, TS_NONE};

/// One committed update captured by a checkpoint.
#[derive(Debug, Clone)]
pub(crate) struct CheckpointUpdate {
    pub commit_ts: Timestamp,
    pub commit_seq: u64,
    pub value: Option<Vec<u8>>,
}

/// Captured committed histories of one table.
pub(crate) struct CheckpointTable {
    rows: BTreeMap<Arc<[u8]>, Vec<CheckpointUpdate>>,
}

impl CheckpointTable {
    pub(crate) fn new(rows: BTreeMap<Arc<[u8]>, Vec<CheckpointUpdate>>) -> Self {
        Self { rows }
    }

    fn visible<'a>(
        updates: &'a [CheckpointUpdate],
        read_ts: Option<Timestamp>,
    ) -> Option<&'a CheckpointUpdate> {
        updates
            .iter()
            .filter(|u| {
                read_ts.is_none_or(|ts| u.commit_ts == TS_NONE || u.commit_ts <= ts)
            })
            .max_by_key(|u| (u.commit_ts, u.commit_seq))
    }

    pub(crate) fn get(&self, key: &[u8], read_ts: Option<Timestamp>) -> Option<Vec<u8>> {
        Self::visible(self.rows.get(key)?, read_ts)?.value.clone()
    }

    /// Next key after `after` with a visible, non-tombstone value.
    pub(crate) fn next_visible(
        &self,
        after: Option<&[u8]>,
        read_ts: Option<Timestamp>,
    ) -> Option<(Arc<[u8]>, Vec<u8>)> {
        let range = match after {
            Some(pos) => self
                .rows
                .range::<[u8], _>((Bound::Excluded(pos), Bound::Unbounded)),
            None => self.rows.range::<[u8], _>(..),
        };
        for (key, updates) in range {
            if let Some(value) = Self::visible(updates, read_ts).and_then(|u| u.value.clone()) {
                return Some((Arc::clone(key), value));
            }
        }
        None
    }

    /// Previous key before `before` with a visible, non-tombstone value.
    pub(crate) fn prev_visible(
        &self,
        before: Option<&[u8]>,
        read_ts: Option<Timestamp>,
    ) -> Option<(Arc<[u8]>, Vec<u8>)> {
        let range = match before {
            Some(pos) => self
                .rows
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(pos))),
            None => self.rows.range::<[u8], _>(..),
        };
        for (key, updates) in range.rev() {
            if let Some(value) = Self::visible(updates, read_ts).and_then(|u| u.value.clone()) {
                return Some((Arc::clone(key), value));
            }
        }
        None
    }
}

pub struct Checkpoint {
    name: Option<String>,
    stable_ts: Option<Timestamp>,
    tables: HashMap<String, CheckpointTable>,
}

impl Checkpoint {
    pub(crate) fn new(
        name: Option<String>,
        stable_ts: Option<Timestamp>,
        tables: HashMap<String, CheckpointTable>,
    ) -> Self {
        Self {
            name,
            stable_ts,
            tables,
        }
    }

    /// The checkpoint's name; unnamed checkpoints have none.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The stable timestamp recorded at creation; `None` when the stable
    /// timestamp had never been set, meaning the checkpoint captured all
    /// committed data with no timestamp bound.
    pub fn stable_timestamp(&self) -> Option<Timestamp> {
        self.stable_ts
    }

    pub(crate) fn table(&self, name: &str) -> Option<&CheckpointTable> {
        self.tables.get(name)
    }
}
