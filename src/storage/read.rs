//! # Verified Block Reads
//!
//! The read sequence, start to finish:
//!
//! 1. Crack the address cookie.
//! 2. Resolve the object id through the handle cache when the manager spans
//!    multiple objects; the handle is released on every exit path.
//! 3. Inform the capacity throttle of the bytes about to be read.
//! 4. Prepare the destination buffer (alignment bookkeeping, size check).
//! 5. Consult the chunk cache if configured; out-of-space falls through to a
//!    direct read.
//! 6. Decode the block header into a host-endian copy, pick the checksum
//!    coverage, and verify in two stages: the stored header checksum must
//!    match the cookie, then the recomputed checksum over the image (with the
//!    stored checksum field zeroed) must match as well.
//! 7. On a data mismatch with the chunk cache configured, evict the
//!    possibly-stale entry and retry the direct read exactly once.
//! 8. A second mismatch is corruption: dump the buffer in 1 KiB chunks, set
//!    the connection-wide corruption latch, and fail with a recoverable error
//!    (verify mode or quiet-corruption sessions) or a fatal panic.
//!
//! ## Corruption Latch
//!
//! The latch is a set-once atomic carried on the block manager and shared
//! with the embedding connection; once set it stays set for the process
//! lifetime.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crc::{Crc, CRC_32_ISCSI};
use eyre::Result;

use super::addr::BlockAddr;
use super::buf::Buf;
use super::chunk::{ChunkCache, ChunkGet};
use super::handles::BlockHandleCache;
use super::headers::{BlockHeader, PageHeader, BLOCK_DATA_CKSUM};
use super::{BlockFile, CapacityThrottle, ThrottleOp};
use crate::config::BLOCK_COMPRESS_SKIP;
use crate::error::ErrorCode;
use crate::session::Session;
use crate::{bail_code, ensure_code};

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Checksum used for block images (CRC-32C).
pub fn block_checksum(data: &[u8]) -> u32 {
    CRC32C.checksum(data)
}

/// One underlying storage object the block manager reads from.
pub struct Block {
    name: String,
    object_id: u32,
    alloc_size: u32,
    verify: bool,
    file: Box<dyn BlockFile>,
}

impl Block {
    pub fn new(
        name: impl Into<String>,
        object_id: u32,
        alloc_size: u32,
        file: Box<dyn BlockFile>,
    ) -> Self {
        Self {
            name: name.into(),
            object_id,
            alloc_size,
            verify: false,
            file,
        }
    }

    /// Marks the block as open for verification: corruption is reported as a
    /// recoverable error instead of a panic.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    pub fn alloc_size(&self) -> u32 {
        self.alloc_size
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn file(&self) -> &dyn BlockFile {
        self.file.as_ref()
    }
}

/// Set-once data-corruption flag, shared with the embedding connection.
#[derive(Debug, Default)]
pub struct CorruptionLatch(AtomicBool);

impl CorruptionLatch {
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct BlockManager {
    primary: Block,
    handles: BlockHandleCache,
    is_multi_handle: bool,
    chunk_cache: Option<Arc<dyn ChunkCache>>,
    throttle: Option<Arc<dyn CapacityThrottle>>,
    corruption: Arc<CorruptionLatch>,
}

impl BlockManager {
    pub fn new(primary: Block) -> Self {
        Self {
            primary,
            handles: BlockHandleCache::new(),
            is_multi_handle: false,
            chunk_cache: None,
            throttle: None,
            corruption: Arc::new(CorruptionLatch::default()),
        }
    }

    pub fn with_chunk_cache(mut self, cache: Arc<dyn ChunkCache>) -> Self {
        self.chunk_cache = Some(cache);
        self
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn CapacityThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Registers a secondary object; the manager becomes multi-handle.
    pub fn add_object(&mut self, block: Block) {
        self.handles.insert(block);
        self.is_multi_handle = true;
    }

    pub fn corruption_latch(&self) -> Arc<CorruptionLatch> {
        Arc::clone(&self.corruption)
    }

    /// Outstanding handle count for a secondary object; test observability.
    pub fn handle_refs(&self, object_id: u32) -> u32 {
        self.handles.refs(object_id)
    }

    /// Maps an address-cookie referenced block into `buf`, verified.
    pub fn read(&self, session: &Session, buf: &mut Buf, addr_cookie: &[u8]) -> Result<()> {
        let addr = BlockAddr::unpack(addr_cookie)?;

        let handle;
        let block: &Block =
            if self.is_multi_handle && addr.object_id != self.primary.object_id() {
                handle = self.handles.acquire(addr.object_id)?;
                handle.block()
            } else {
                &self.primary
            };

        if let Some(throttle) = &self.throttle {
            throttle.throttle(u64::from(addr.size), ThrottleOp::Read);
        }

        self.read_off(session, block, buf, &addr)?;

        // Optionally discard the bytes from the system's buffer cache.
        block.file().advise_dont_need(addr.offset, addr.size as usize);
        Ok(())
    }

    /// Reports a block as corrupted: re-reads it and dumps the contents.
    pub fn corrupt(&self, session: &Session, addr_cookie: &[u8]) -> Result<()> {
        let mut tmp = Buf::new();
        self.read(session, &mut tmp, addr_cookie)?;

        let addr = BlockAddr::unpack(addr_cookie)?;
        corrupt_dump(&tmp, &addr);
        Ok(())
    }

    /// Reads the block at an offset blind, returning the header's
    /// `(disk_size, checksum)`. Diagnostic use only.
    pub fn read_blind(&self, offset: u64) -> Result<(u32, u32)> {
        let alloc_size = self.primary.alloc_size() as usize;
        let mut tmp = Buf::with_capacity(alloc_size);
        self.primary
            .file()
            .read_at(offset, &mut tmp.mem_mut()[..alloc_size])?;
        tmp.set_size(alloc_size);

        let header = BlockHeader::decode(tmp.as_slice())?;
        Ok((header.disk_size, header.checksum))
    }

    fn read_off(
        &self,
        session: &Session,
        block: &Block,
        buf: &mut Buf,
        addr: &BlockAddr,
    ) -> Result<()> {
        tracing::debug!(
            target: "burrowdb::block",
            offset = addr.offset,
            size = addr.size,
            checksum = addr.checksum,
            "read"
        );

        let size = addr.size as usize;

        // Grow the buffer as necessary before the read. Buffers should be
        // aligned for reading, but there are many buffers and it is hard to
        // be sure all of them were; an unaligned buffer gets the flag set and
        // a guaranteed reallocation so subsequent reads are aligned.
        let bufsize = if buf.aligned() {
            size
        } else {
            buf.set_aligned(true);
            buf.aligned_growth(size)
        };

        ensure_code!(
            addr.size >= block.alloc_size(),
            ErrorCode::InvalidArgument,
            "{}: impossibly small block size of {}B, less than allocation size of {}",
            block.name(),
            addr.size,
            block.alloc_size()
        );

        buf.init(bufsize);
        buf.set_size(size);

        // A chunk-cache out-of-space result is not propagated; the needed
        // data is read directly instead.
        let mut chunkcache_hit = false;
        if let Some(cache) = &self.chunk_cache {
            chunkcache_hit = matches!(
                cache.get(
                    block.file(),
                    addr.object_id,
                    addr.offset,
                    addr.size,
                    &mut buf.mem_mut()[..size],
                )?,
                ChunkGet::Filled
            );
        }
        if !chunkcache_hit {
            block.file().read_at(addr.offset, &mut buf.mem_mut()[..size])?;
        }

        let check_size_for = |flags: u8| {
            if flags & BLOCK_DATA_CKSUM != 0 {
                size
            } else {
                BLOCK_COMPRESS_SKIP.min(size)
            }
        };

        let mut retried = false;
        loop {
            let header = BlockHeader::decode(buf.as_slice())?;
            let check_size = check_size_for(header.flags);

            if header.checksum == addr.checksum {
                BlockHeader::zero_checksum(&mut buf.mem_mut()[..size]);
                let computed = block_checksum(&buf.as_slice()[..check_size]);
                if computed == addr.checksum {
                    // Swap the page header as needed; this is the one place
                    // every successful read passes through.
                    let page = PageHeader::from_bytes(buf.as_slice())?;
                    tracing::debug!(
                        target: "burrowdb::block",
                        page_type = ?page.page_type(),
                        mem_size = page.mem_size(),
                        "verified"
                    );
                    return Ok(());
                }

                // The chunk cache may hold stale content for a rewritten
                // object, which shows up as a mismatched checksum. Evict the
                // external entry and retry the direct read exactly once.
                if !retried {
                    if let Some(cache) = &self.chunk_cache {
                        cache.invalidate(addr.object_id, addr.offset, addr.size);
                        block
                            .file()
                            .read_at(addr.offset, &mut buf.mem_mut()[..size])?;
                        retried = true;
                        continue;
                    }
                }

                if !session.quiet_corrupt_file() {
                    tracing::error!(
                        target: "burrowdb::block",
                        "{}: potential hardware corruption, read checksum error for {}B \
                         block at offset {}: calculated block checksum of {:#x} doesn't \
                         match expected checksum of {:#x}",
                        block.name(),
                        addr.size,
                        addr.offset,
                        computed,
                        addr.checksum
                    );
                }
            } else if !session.quiet_corrupt_file() {
                tracing::error!(
                    target: "burrowdb::block",
                    "{}: potential hardware corruption, read checksum error for {}B \
                     block at offset {}: block header checksum of {:#x} doesn't match \
                     expected checksum of {:#x}",
                    block.name(),
                    addr.size,
                    addr.offset,
                    header.checksum,
                    addr.checksum
                );
            }
            break;
        }

        if !session.quiet_corrupt_file() {
            corrupt_dump(buf, addr);
        }

        // Panic if a checksum fails during an ordinary read.
        self.corruption.set();
        if block.verify() || session.quiet_corrupt_file() {
            bail_code!(ErrorCode::Corruption, "{}: read checksum error", block.name());
        }
        bail_code!(ErrorCode::Panic, "{}: fatal read error", block.name());
    }
}

/// Dumps a block into the log in 1 KiB chunks.
fn corrupt_dump(buf: &Buf, addr: &BlockAddr) {
    let prefix = format!(
        "{{{}: {}, {}, {:#x}}}",
        addr.object_id, addr.offset, addr.size, addr.checksum
    );

    let data = buf.as_slice();
    if data.is_empty() {
        tracing::error!(target: "burrowdb::block", "{}: empty buffer, no dump available", prefix);
        return;
    }

    let nchunks = data.len().div_ceil(1024);
    for (chunk, bytes) in data.chunks(1024).enumerate() {
        let mut hex = String::with_capacity(bytes.len() * 3);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x} ");
        }
        tracing::error!(
            target: "burrowdb::block",
            "{}: (chunk {} of {}): {}",
            prefix,
            chunk + 1,
            nchunks,
            hex
        );
    }
}
