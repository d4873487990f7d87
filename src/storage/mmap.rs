//! # Block File Implementations
//!
//! Two `BlockFile` backends:
//!
//! - [`MmapBlockFile`]: a read-only memory-mapped file. Positioned reads are
//!   a bounds check plus a copy out of the mapping; the OS page cache does
//!   the rest. The post-read discard hint forwards to `madvise` where the
//!   platform supports it.
//! - [`VecBlockFile`]: an in-memory byte vector, used by tests and as the
//!   backing for scratch objects.
//!
//! The mapping is never remapped after open: the block manager's read path
//! only reads, and file growth belongs to the write path outside this crate.

use std::fs::File;
use std::path::Path;

use eyre::{Result, WrapErr};
use memmap2::Mmap;

use super::BlockFile;
use crate::error::ErrorCode;
use crate::ensure_code;

pub struct MmapBlockFile {
    mmap: Mmap,
}

impl MmapBlockFile {
    /// Maps an existing file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open block file {}", path.display()))?;

        // SAFETY: the mapping is private and read-only; BurrowDB never
        // truncates a mapped object (growth and truncation belong to the
        // write path, which remaps before publishing new addresses).
        let mmap = unsafe { Mmap::map(&file) }
            .wrap_err_with(|| format!("failed to map block file {}", path.display()))?;

        Ok(Self { mmap })
    }
}

impl BlockFile for MmapBlockFile {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(dest.len() as u64)
            .filter(|&end| end <= self.mmap.len() as u64);
        ensure_code!(
            end.is_some(),
            ErrorCode::Io,
            "read of {} bytes at offset {} past end of {}-byte object",
            dest.len(),
            offset,
            self.mmap.len()
        );

        let start = offset as usize;
        dest.copy_from_slice(&self.mmap[start..start + dest.len()]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    #[cfg(unix)]
    fn advise_dont_need(&self, offset: u64, len: usize) {
        // SAFETY: the mapping is read-only and file-backed, so discarding
        // pages in this range only drops cached data that can be re-read
        // from the underlying file; it cannot observe or corrupt writes.
        let _ = unsafe {
            self.mmap.unchecked_advise_range(
                memmap2::UncheckedAdvice::DontNeed,
                offset as usize,
                len,
            )
        };
    }
}

/// In-memory block file.
pub struct VecBlockFile {
    data: Vec<u8>,
}

impl VecBlockFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl BlockFile for VecBlockFile {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(dest.len() as u64)
            .filter(|&end| end <= self.data.len() as u64);
        ensure_code!(
            end.is_some(),
            ErrorCode::Io,
            "read of {} bytes at offset {} past end of {}-byte object",
            dest.len(),
            offset,
            self.data.len()
        );

        let start = offset as usize;
        dest.copy_from_slice(&self.data[start..start + dest.len()]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
