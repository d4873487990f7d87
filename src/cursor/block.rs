//! # Block Cursor
//!
//! A batch cursor restricted to row-store tables with raw byte-string
//! key/value formats. One call to [`BlockCursor::next_raw_n`] (or
//! `prev_raw_n`) produces up to `MAX_BLOCK_ITEM` key/value pairs into the
//! cursor's pre-owned buffers:
//!
//! - The first advance crosses page boundaries and its errors propagate —
//!   including `NOT_FOUND` from an exhausted cursor.
//! - Subsequent advances take the intra-page fast path; `NOT_FOUND` and
//!   `PREPARE_CONFLICT` terminate the batch cleanly, they are not errors.
//! - The batch also stops when the buffers are full.
//!
//! ## Key Materialization
//!
//! Values are recorded by the walk directly into the cursor's value buffers.
//! Keys materialize into cursor storage only when the walk's per-step flag
//! requires a copy; stable keys are retained by reference-count instead of
//! copying.
//!
//! ## Position and Cleanup
//!
//! On return the cursor holds an active position on the last yielded row,
//! and the caller reads only through the returned arrays. Errors other than
//! the clean terminations propagate after the partially-filled buffers are
//! reset.

use std::sync::Arc;

use eyre::Result;

use super::walk::TreeWalk;
use crate::config::MAX_BLOCK_ITEM;
use crate::error::ErrorCode;
use crate::mvcc::table::{TableConfig, TableType, RAW_FORMAT};
use crate::storage::Buf;
use crate::ensure_code;

/// One key slot in a batch: empty, copied into the cursor, or retained by
/// reference count.
#[derive(Debug, Clone, Default)]
pub enum KeyBuf {
    #[default]
    Empty,
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
}

impl KeyBuf {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyBuf::Empty => &[],
            KeyBuf::Owned(bytes) => bytes,
            KeyBuf::Shared(bytes) => bytes,
        }
    }
}

pub struct BlockCursor<W: TreeWalk> {
    walk: W,
    keys: Vec<KeyBuf>,
    values: Vec<Buf>,
}

impl<W: TreeWalk> std::fmt::Debug for BlockCursor<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCursor").finish_non_exhaustive()
    }
}

impl<W: TreeWalk> BlockCursor<W> {
    /// Builds a block cursor over a walk. Only row-store tables with raw
    /// key/value formats are supported.
    pub fn new(config: &TableConfig, walk: W) -> Result<Self> {
        ensure_code!(
            config.table_type == TableType::Row,
            ErrorCode::InvalidArgument,
            "block cursor only supports row store"
        );
        ensure_code!(
            config.key_format == RAW_FORMAT && config.value_format == RAW_FORMAT,
            ErrorCode::InvalidArgument,
            "block cursor only supports raw format"
        );

        Ok(Self {
            walk,
            keys: vec![KeyBuf::Empty; MAX_BLOCK_ITEM],
            values: (0..MAX_BLOCK_ITEM).map(|_| Buf::new()).collect(),
        })
    }

    /// Fills the buffers walking forward; returns `(keys, values, n)`.
    pub fn next_raw_n(&mut self) -> Result<(&[KeyBuf], &[Buf], usize)> {
        let n = self.fill(true)?;
        Ok((&self.keys[..n], &self.values[..n], n))
    }

    /// Fills the buffers walking backward; returns `(keys, values, n)`.
    pub fn prev_raw_n(&mut self) -> Result<(&[KeyBuf], &[Buf], usize)> {
        let n = self.fill(false)?;
        Ok((&self.keys[..n], &self.values[..n], n))
    }

    /// Abandons the position and clears the buffers.
    pub fn reset(&mut self) {
        self.walk.reset();
        self.clear_buffers(MAX_BLOCK_ITEM);
    }

    fn fill(&mut self, forward: bool) -> Result<usize> {
        let mut count = 0;

        // First advance: crosses page boundaries, errors propagate.
        let first = if forward {
            self.walk.next(&mut self.values[0])
        } else {
            self.walk.prev(&mut self.values[0])
        };
        if let Err(err) = first {
            self.clear_buffers(1);
            return Err(err);
        }
        self.record_key(0);
        count += 1;

        // Ignore not-found and prepare-conflict from this point: they end
        // the batch, not the call.
        while count < MAX_BLOCK_ITEM {
            let step = if forward {
                self.walk.next_on_page(&mut self.values[count])
            } else {
                self.walk.prev_on_page(&mut self.values[count])
            };
            match step {
                Ok(()) => {
                    self.record_key(count);
                    count += 1;
                }
                Err(err)
                    if matches!(
                        ErrorCode::of(&err),
                        Some(ErrorCode::NotFound | ErrorCode::PrepareConflict)
                    ) =>
                {
                    break;
                }
                Err(err) => {
                    self.clear_buffers(count + 1);
                    return Err(err);
                }
            }
        }

        Ok(count)
    }

    fn record_key(&mut self, index: usize) {
        self.keys[index] = if self.walk.key_copy_required() {
            KeyBuf::Owned(self.walk.key().to_vec())
        } else {
            match self.walk.key_shared() {
                Some(key) => KeyBuf::Shared(key),
                None => KeyBuf::Owned(self.walk.key().to_vec()),
            }
        };
    }

    fn clear_buffers(&mut self, up_to: usize) {
        for key in &mut self.keys[..up_to] {
            *key = KeyBuf::Empty;
        }
        for value in &mut self.values[..up_to] {
            value.clear();
        }
    }
}
