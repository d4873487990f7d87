//! # BurrowDB Configuration Constants
//!
//! This module centralizes all configuration constants, grouping interdependent
//! values together and documenting their relationships. Constants that depend
//! on each other are co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_ALLOC_SIZE (4096 bytes)
//!       │
//!       ├─> BLOCK_COMPRESS_SKIP (must be <=)
//!       │     The checksum of a compressed block covers only its first
//!       │     BLOCK_COMPRESS_SKIP bytes, which must fit inside the first
//!       │     allocation-size unit so a blind header read sees them.
//!       │
//!       └─> PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE (must be <=)
//!             Both headers live in the first allocation-size unit.
//!
//! BLOCK_COMPRESS_SKIP (64 bytes)
//!       │
//!       └─> >= PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE (40 bytes)
//!             The skip region must cover both on-disk headers, or a
//!             checksum over the skip prefix would miss header corruption.
//!
//! ALLOC_REGION_SIZE (64 MiB)
//!       │
//!       └─> carved into ALLOC_SLOTS_PER_REGION page slots, tracked by one
//!           bitmap byte per region. The bitmap byte width fixes the slot
//!           count at 8.
//!
//! MAX_BLOCK_ITEM (256)
//!       │
//!       └─> Block cursors own MAX_BLOCK_ITEM key buffers and MAX_BLOCK_ITEM
//!           value buffers for the lifetime of the cursor.
//! ```
//!
//! ## Critical Invariants
//!
//! These invariants are enforced by compile-time assertions:
//!
//! 1. `BLOCK_COMPRESS_SKIP >= PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE`
//! 2. `DEFAULT_ALLOC_SIZE >= BLOCK_COMPRESS_SKIP`
//! 3. `ALLOC_SLOTS_PER_REGION == 8` (one bitmap byte per region)
//!
//! ## Usage
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use crate::config::{DEFAULT_ALLOC_SIZE, MAX_BLOCK_ITEM};
//! ```

/// On-disk page header size in bytes.
pub const PAGE_HEADER_SIZE: usize = 28;

/// On-disk block header size in bytes; follows the page header.
pub const BLOCK_HEADER_SIZE: usize = 12;

/// Byte offset of the block header within a block image.
pub const BLOCK_HEADER_OFFSET: usize = PAGE_HEADER_SIZE;

/// Checksum coverage for blocks without the data-checksum flag: only the
/// first BLOCK_COMPRESS_SKIP bytes are checksummed, because the remainder
/// of a compressed block is rewritten by the compressor.
pub const BLOCK_COMPRESS_SKIP: usize = 64;

/// Default minimum I/O granularity for block reads and writes.
pub const DEFAULT_ALLOC_SIZE: u32 = 4096;

/// Default byte size of one allocator region.
pub const ALLOC_REGION_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum number of live allocator regions.
pub const ALLOC_REGION_COUNT: usize = 128;

/// Page slots carved from each region; one bitmap byte tracks them all.
pub const ALLOC_SLOTS_PER_REGION: usize = 8;

/// Bitmap byte for a region with every slot free.
pub const ALLOC_MAP_FREE: u8 = 0xff;

/// Maximum key/value pairs produced by one block-cursor batch.
pub const MAX_BLOCK_ITEM: usize = 256;

/// Rows per emulated leaf page in the model-backed tree walk.
pub const WALK_ROWS_PER_PAGE: usize = 32;

/// Growth slack when an unaligned read buffer is reallocated.
pub const BUF_ALIGN_SLACK: usize = 10;

const _: () = assert!(BLOCK_COMPRESS_SKIP >= PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE);
const _: () = assert!(DEFAULT_ALLOC_SIZE as usize >= BLOCK_COMPRESS_SKIP);
const _: () = assert!(ALLOC_SLOTS_PER_REGION == 8);
const _: () = assert!(MAX_BLOCK_ITEM > 0);
