//! # Block Handle Cache
//!
//! A block manager configured over multiple underlying objects resolves an
//! address cookie's `object_id` to a concrete [`Block`] through this cache.
//! Acquisition returns a [`BlockHandle`] guard; the reference count drops when
//! the guard does, so a handle is released exactly once on every exit path,
//! success or failure.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;

use super::read::Block;
use crate::bail_code;
use crate::error::ErrorCode;

struct BlockEntry {
    block: Block,
    refs: AtomicU32,
}

#[derive(Default)]
pub struct BlockHandleCache {
    map: RwLock<HashMap<u32, Arc<BlockEntry>>>,
}

impl BlockHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a block under its object id, replacing any previous entry.
    pub fn insert(&self, block: Block) {
        let entry = Arc::new(BlockEntry {
            refs: AtomicU32::new(0),
            block,
        });
        self.map.write().insert(entry.block.object_id(), entry);
    }

    /// Acquires a handle on the block for `object_id`.
    pub fn acquire(&self, object_id: u32) -> Result<BlockHandle> {
        let map = self.map.read();
        let Some(entry) = map.get(&object_id) else {
            bail_code!(ErrorCode::NotFound, "unknown block object {object_id}");
        };
        entry.refs.fetch_add(1, Ordering::AcqRel);
        Ok(BlockHandle {
            entry: Arc::clone(entry),
        })
    }

    /// Outstanding handle count for `object_id`; 0 for unknown objects.
    pub fn refs(&self, object_id: u32) -> u32 {
        self.map
            .read()
            .get(&object_id)
            .map_or(0, |entry| entry.refs.load(Ordering::Acquire))
    }
}

/// A ref-counted reference to a cached block. Releases on drop.
pub struct BlockHandle {
    entry: Arc<BlockEntry>,
}

impl std::fmt::Debug for BlockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockHandle").finish_non_exhaustive()
    }
}

impl BlockHandle {
    pub fn block(&self) -> &Block {
        &self.entry.block
    }
}

impl Drop for BlockHandle {
    fn drop(&mut self) {
        let prev = self.entry.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "block handle released twice");
    }
}
