//! # On-Disk Header Definitions
//!
//! This module provides the zerocopy-based header structs for block images.
//! Every block starts with a page header describing the in-memory page it
//! reconstitutes, followed by a block header describing the on-disk block
//! itself.
//!
//! ## Block Image Layout
//!
//! ```text
//! Offset  Size  Struct        Field
//! ------  ----  ------------  -------------------------------------
//! 0       8     PageHeader    recno      (column stores; 0 for rows)
//! 8       8     PageHeader    write_gen
//! 16      4     PageHeader    mem_size   (in-memory page footprint)
//! 20      4     PageHeader    entries
//! 24      1     PageHeader    page_type
//! 25      1     PageHeader    flags
//! 26      2     PageHeader    unused
//! 28      4     BlockHeader   disk_size
//! 32      4     BlockHeader   checksum
//! 36      1     BlockHeader   flags      (BLOCK_DATA_CKSUM)
//! 37      3     BlockHeader   unused
//! ```
//!
//! ## Endianness
//!
//! Both headers are stored little-endian. The `zerocopy` little-endian
//! wrapper types plus the `zerocopy_accessors!` macro make the accessor the
//! byte-swap point: the structs view raw buffer bytes, and every `get`
//! converts to host order. [`BlockHeader::decode`] additionally snapshots the
//! fields into a host-endian local copy so verification can compare against
//! a buffer whose stored checksum has been zeroed.
//!
//! ## Checksum Coverage
//!
//! `BLOCK_DATA_CKSUM` set means the checksum covers the whole block. Clear
//! means the block body is compressed and only the first
//! `BLOCK_COMPRESS_SKIP` bytes are covered.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{BLOCK_HEADER_OFFSET, BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::zerocopy_accessors;

/// Block-header flag: the checksum covers the whole block.
pub const BLOCK_DATA_CKSUM: u8 = 0x01;

/// Byte offset of the stored checksum field within a block image.
pub const BLOCK_CHECKSUM_OFFSET: usize = BLOCK_HEADER_OFFSET + 4;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Invalid = 0x00,
    RowInterior = 0x01,
    RowLeaf = 0x02,
    Overflow = 0x03,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => PageType::RowInterior,
            0x02 => PageType::RowLeaf,
            0x03 => PageType::Overflow,
            _ => PageType::Invalid,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    recno: U64,
    write_gen: U64,
    mem_size: U32,
    entries: U32,
    page_type: u8,
    flags: u8,
    unused: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        parse(bytes, PAGE_HEADER_SIZE, "PageHeader")
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        parse_mut(bytes, PAGE_HEADER_SIZE, "PageHeader")
    }

    zerocopy_accessors! {
        recno: u64,
        write_gen: u64,
        mem_size: u32,
        entries: u32,
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.page_type = page_type as u8;
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockHeader {
    disk_size: U32,
    checksum: U32,
    flags: u8,
    unused: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() == BLOCK_HEADER_SIZE);

/// Host-endian snapshot of a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeaderFields {
    pub disk_size: u32,
    pub checksum: u32,
    pub flags: u8,
}

impl BlockHeader {
    /// Views the block header inside a full block image.
    pub fn from_block(block: &[u8]) -> Result<&Self> {
        ensure!(
            block.len() >= BLOCK_HEADER_OFFSET + BLOCK_HEADER_SIZE,
            "block of {} bytes cannot hold a block header",
            block.len()
        );
        parse(&block[BLOCK_HEADER_OFFSET..], BLOCK_HEADER_SIZE, "BlockHeader")
    }

    /// Views the block header inside a full block image, mutably. The write
    /// path builds headers this way; it also lets tests forge blocks.
    pub fn from_block_mut(block: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            block.len() >= BLOCK_HEADER_OFFSET + BLOCK_HEADER_SIZE,
            "block of {} bytes cannot hold a block header",
            block.len()
        );
        parse_mut(
            &mut block[BLOCK_HEADER_OFFSET..],
            BLOCK_HEADER_SIZE,
            "BlockHeader",
        )
    }

    /// Snapshots the header of a block image into host order.
    pub fn decode(block: &[u8]) -> Result<BlockHeaderFields> {
        let header = Self::from_block(block)?;
        Ok(BlockHeaderFields {
            disk_size: header.disk_size(),
            checksum: header.checksum(),
            flags: header.flags,
        })
    }

    /// Zeroes the stored checksum field inside a block image, as checksum
    /// verification requires.
    pub fn zero_checksum(block: &mut [u8]) {
        block[BLOCK_CHECKSUM_OFFSET..BLOCK_CHECKSUM_OFFSET + 4].fill(0);
    }

    zerocopy_accessors! {
        disk_size: u32,
        checksum: u32,
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }
}

fn parse<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    size: usize,
    type_name: &str,
) -> Result<&'a T> {
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

fn parse_mut<'a, T: FromBytes + KnownLayout + IntoBytes>(
    bytes: &'a mut [u8],
    size: usize,
    type_name: &str,
) -> Result<&'a mut T> {
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
