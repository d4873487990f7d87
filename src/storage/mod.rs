//! # Storage Module — Block Manager Read Path
//!
//! This module converts address cookies into verified page bytes. It owns the
//! read side of the block manager: cookie decoding, buffer preparation,
//! checksum verification, chunk-cache coordination, and corruption handling.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  BlockManager::read(session, buf, cookie) │
//! ├───────────────────────────────────────────┤
//! │  addr: cookie → (object, offset,          │
//! │                  size, checksum)          │
//! ├──────────────┬────────────────────────────┤
//! │ handle cache │ chunk cache (optional)     │
//! ├──────────────┴────────────────────────────┤
//! │  BlockFile (mmap / in-memory)             │
//! └───────────────────────────────────────────┘
//! ```
//!
//! The write path, reconciliation, and recovery live outside this crate; the
//! block manager is bit-exact with the cookie encoder and the on-disk header
//! layout they produce.
//!
//! ## On-Disk Layout
//!
//! Every block starts with a 28-byte page header followed by a 12-byte block
//! header, both little-endian. The block-header checksum covers either the
//! whole block (`BLOCK_DATA_CKSUM`) or only the first `BLOCK_COMPRESS_SKIP`
//! bytes of a compressed block.
//!
//! ## External Collaborators
//!
//! - [`BlockFile`]: positioned reads over stable storage, plus the optional
//!   OS page-cache discard hint. Implementations: [`MmapBlockFile`]
//!   (memory-mapped) and [`VecBlockFile`] (in-memory, tests).
//! - [`CapacityThrottle`]: informed of every direct read before it is issued.
//! - [`ChunkCache`]: optional read-through cache; running out of space is a
//!   soft failure the read path absorbs.
//!
//! ## Module Organization
//!
//! - `addr`: address-cookie varint pack/unpack
//! - `headers`: on-disk page and block headers (`zerocopy`)
//! - `buf`: read buffer with alignment bookkeeping
//! - `chunk`: chunk-cache trait and bounded in-memory implementation
//! - `handles`: ref-counted block-handle cache for multi-object managers
//! - `read`: the verified read sequence and corruption handling
//! - `mmap`: memory-mapped and in-memory `BlockFile` implementations

mod addr;
mod buf;
mod chunk;
mod handles;
mod headers;
mod mmap;
mod read;

pub use addr::BlockAddr;
pub use buf::Buf;
pub use chunk::{ChunkCache, ChunkGet, MemChunkCache};
pub use handles::{BlockHandle, BlockHandleCache};
pub use headers::{
    BlockHeader, PageHeader, PageType, BLOCK_CHECKSUM_OFFSET, BLOCK_DATA_CKSUM,
};
pub use mmap::{MmapBlockFile, VecBlockFile};
pub use read::{block_checksum, Block, BlockManager, CorruptionLatch};

use eyre::Result;

/// Positioned reads over one underlying storage object.
///
/// Raw file-system primitives are outside this crate; this is the seam the
/// block manager reads through.
pub trait BlockFile: Send + Sync {
    /// Reads exactly `dest.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()>;

    /// Object size in bytes.
    fn size(&self) -> u64;

    /// Advises the OS to drop cached bytes for the range. Best effort.
    fn advise_dont_need(&self, _offset: u64, _len: usize) {}
}

/// Direction tag for capacity throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOp {
    Read,
    Write,
}

/// External capacity throttle, informed before each direct read.
pub trait CapacityThrottle: Send + Sync {
    fn throttle(&self, bytes: u64, op: ThrottleOp);
}
