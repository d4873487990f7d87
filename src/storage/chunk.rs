//! # Chunk Cache
//!
//! Optional read-through cache consulted before a direct block read. The
//! cache is an external collaborator: the read path only depends on the
//! [`ChunkCache`] trait. Two outcomes matter to the read path:
//!
//! - `Filled`: the destination holds the bytes (from cache or read-through).
//! - `NoSpace`: the cache is over capacity and cannot admit the chunk. This
//!   is not fatal — the read path falls through to a direct read.
//!
//! A cached chunk can also be stale when the underlying object was rewritten
//! out-of-band; the read path detects that through checksum mismatch and
//! calls [`ChunkCache::invalidate`] before retrying the direct read.
//!
//! [`MemChunkCache`] is a capacity-bounded in-memory implementation used by
//! tests and small deployments.

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::BlockFile;

/// Outcome of a chunk-cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkGet {
    /// The destination buffer holds the requested bytes.
    Filled,
    /// The cache is out of space; the caller reads directly instead.
    NoSpace,
}

pub trait ChunkCache: Send + Sync {
    /// Fills `dest` with `size` bytes of `object_id` at `offset`, reading
    /// through `file` and caching on miss.
    fn get(
        &self,
        file: &dyn BlockFile,
        object_id: u32,
        offset: u64,
        size: u32,
        dest: &mut [u8],
    ) -> Result<ChunkGet>;

    /// Drops any cached content for the range, stale or not.
    fn invalidate(&self, object_id: u32, offset: u64, size: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChunkKey {
    object_id: u32,
    offset: u64,
    size: u32,
}

struct ChunkInner {
    chunks: HashMap<ChunkKey, Box<[u8]>>,
    used: usize,
}

/// Capacity-bounded in-memory chunk cache.
pub struct MemChunkCache {
    capacity: usize,
    inner: Mutex<ChunkInner>,
}

impl MemChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(ChunkInner {
                chunks: HashMap::new(),
                used: 0,
            }),
        }
    }

    /// Installs content for a range without going through the file, the way
    /// an external flush would. The content may later prove stale.
    pub fn ingest(&self, object_id: u32, offset: u64, data: &[u8]) {
        let key = ChunkKey {
            object_id,
            offset,
            size: data.len() as u32,
        };
        let mut inner = self.inner.lock();
        if let Some(old) = inner.chunks.insert(key, data.into()) {
            inner.used -= old.len();
        }
        inner.used += data.len();
    }

    /// Bytes currently cached.
    pub fn used(&self) -> usize {
        self.inner.lock().used
    }
}

impl ChunkCache for MemChunkCache {
    fn get(
        &self,
        file: &dyn BlockFile,
        object_id: u32,
        offset: u64,
        size: u32,
        dest: &mut [u8],
    ) -> Result<ChunkGet> {
        let key = ChunkKey {
            object_id,
            offset,
            size,
        };

        let mut inner = self.inner.lock();
        if let Some(chunk) = inner.chunks.get(&key) {
            dest[..size as usize].copy_from_slice(chunk);
            return Ok(ChunkGet::Filled);
        }

        if inner.used + size as usize > self.capacity {
            return Ok(ChunkGet::NoSpace);
        }

        file.read_at(offset, &mut dest[..size as usize])?;
        inner.chunks.insert(key, dest[..size as usize].into());
        inner.used += size as usize;
        Ok(ChunkGet::Filled)
    }

    fn invalidate(&self, object_id: u32, offset: u64, size: u32) {
        let key = ChunkKey {
            object_id,
            offset,
            size,
        };
        let mut inner = self.inner.lock();
        if let Some(old) = inner.chunks.remove(&key) {
            inner.used -= old.len();
        }
    }
}
