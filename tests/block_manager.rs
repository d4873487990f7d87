//! # Block Manager Integration Tests
//!
//! These tests play the write path: they forge block images the way the
//! encoder lays them out (page header, block header, payload, checksum) and
//! drive the read path through cookies — round trips, checksum coverage,
//! chunk-cache coordination, corruption taxonomy, and handle bookkeeping.

use std::sync::Arc;

use burrowdb::config::{BLOCK_COMPRESS_SKIP, BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use burrowdb::error::ErrorCode;
use burrowdb::storage::{
    block_checksum, Block, BlockAddr, BlockHeader, BlockManager, Buf, CapacityThrottle,
    MemChunkCache, PageHeader, PageType, ThrottleOp, VecBlockFile, BLOCK_DATA_CKSUM,
};
use burrowdb::Session;
use parking_lot::Mutex;

const ALLOC_SIZE: u32 = 512;

/// Builds a block image the way the write path would: headers, payload,
/// zero padding to the allocation size, and the checksum stored in the
/// block header. Returns the image and its checksum.
fn build_block(payload: &[u8], data_cksum: bool) -> (Vec<u8>, u32) {
    let header_size = PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE;
    let size = (header_size + payload.len()).next_multiple_of(ALLOC_SIZE as usize);
    let mut image = vec![0u8; size];
    image[header_size..header_size + payload.len()].copy_from_slice(payload);

    {
        let page = PageHeader::from_bytes_mut(&mut image).unwrap();
        page.set_mem_size(size as u32);
        page.set_entries(1);
        page.set_page_type(PageType::RowLeaf);
    }
    {
        let block = BlockHeader::from_block_mut(&mut image).unwrap();
        block.set_disk_size(size as u32);
        block.set_flags(if data_cksum { BLOCK_DATA_CKSUM } else { 0 });
    }

    let check_size = if data_cksum { size } else { BLOCK_COMPRESS_SKIP };
    let checksum = block_checksum(&image[..check_size]);
    BlockHeader::from_block_mut(&mut image)
        .unwrap()
        .set_checksum(checksum);
    (image, checksum)
}

fn cookie(object_id: u32, offset: u64, image: &[u8], checksum: u32) -> Vec<u8> {
    BlockAddr {
        object_id,
        offset,
        size: image.len() as u32,
        checksum,
    }
    .pack()
}

fn manager_for(image: Vec<u8>) -> BlockManager {
    BlockManager::new(Block::new(
        "test.bdb",
        0,
        ALLOC_SIZE,
        Box::new(VecBlockFile::new(image)),
    ))
}

/// A block's verified image is its stored image with the checksum field
/// zeroed — never silently different bytes.
#[test]
fn read_round_trips_written_blocks() {
    let (image, checksum) = build_block(b"row store payload", true);
    let bm = manager_for(image.clone());
    let session = Session::new();
    let mut buf = Buf::new();

    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();

    let mut expected = image;
    BlockHeader::zero_checksum(&mut expected);
    assert_eq!(buf.as_slice(), expected.as_slice());
    assert!(!bm.corruption_latch().is_set());
}

#[test]
fn unaligned_buffer_is_fixed_and_grown() {
    let (image, checksum) = build_block(b"x", true);
    let bm = manager_for(image.clone());
    let session = Session::new();

    let mut buf = Buf::new();
    assert!(!buf.aligned());
    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();
    assert!(buf.aligned());
    assert!(buf.memsize() >= image.len());
    assert_eq!(buf.size(), image.len());
}

#[test]
fn undersized_block_is_an_invalid_argument() {
    let (image, checksum) = build_block(b"x", true);
    let bm = manager_for(image.clone());
    let session = Session::new();
    let mut buf = Buf::new();

    let addr = BlockAddr {
        object_id: 0,
        offset: 0,
        size: ALLOC_SIZE - 1,
        checksum,
    };
    let err = bm.read(&session, &mut buf, &addr.pack()).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::InvalidArgument));
}

/// Without the data-checksum flag only the compress-skip prefix is covered:
/// corruption past it goes undetected by design, corruption inside it fails.
#[test]
fn prefix_checksum_covers_only_the_skip_region() {
    let (image, checksum) = build_block(&[0xaa; 400], false);

    let mut tail_corrupt = image.clone();
    let last = tail_corrupt.len() - 1;
    tail_corrupt[last] ^= 0xff;
    let bm = manager_for(tail_corrupt);
    let session = Session::new();
    let mut buf = Buf::new();
    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();

    let mut prefix_corrupt = image.clone();
    prefix_corrupt[BLOCK_COMPRESS_SKIP - 1] ^= 0xff;
    let bm = manager_for(prefix_corrupt);
    let mut buf = Buf::new();
    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
}

/// Corruption during an ordinary read is fatal; quiet-corruption sessions
/// and verify-mode blocks get a recoverable error instead. The latch is set
/// either way, exactly once.
#[test]
fn corruption_taxonomy_and_latch() {
    let (image, checksum) = build_block(b"will be corrupted", true);
    let mut corrupt = image.clone();
    corrupt[PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE + 2] ^= 0x01;

    // Ordinary read: panic.
    let bm = manager_for(corrupt.clone());
    let session = Session::new();
    let mut buf = Buf::new();
    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    assert!(bm.corruption_latch().is_set());

    // Quiet corruption: recoverable.
    let bm = manager_for(corrupt.clone());
    let mut session = Session::new();
    session.set_quiet_corrupt_file(true);
    let mut buf = Buf::new();
    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Corruption));

    // Verify mode: recoverable.
    let bm = BlockManager::new(
        Block::new(
            "verify.bdb",
            0,
            ALLOC_SIZE,
            Box::new(VecBlockFile::new(corrupt)),
        )
        .with_verify(true),
    );
    let session = Session::new();
    let mut buf = Buf::new();
    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Corruption));
    assert!(bm.corruption_latch().is_set());
}

/// A cookie whose expected checksum disagrees with the stored header fails
/// without touching the data-checksum stage.
#[test]
fn header_checksum_mismatch_fails() {
    let (image, checksum) = build_block(b"payload", true);
    let bm = manager_for(image.clone());
    let session = Session::new();
    let mut buf = Buf::new();

    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum ^ 1))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
}

/// A chunk cache without room is not fatal; the read falls through to the
/// direct path.
#[test]
fn chunk_cache_out_of_space_falls_through() {
    let (image, checksum) = build_block(b"direct read", true);
    let cache = Arc::new(MemChunkCache::new(0));
    let bm = manager_for(image.clone()).with_chunk_cache(cache.clone());
    let session = Session::new();
    let mut buf = Buf::new();

    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();
    assert_eq!(cache.used(), 0);
}

/// Stale chunk-cache content (fresh header, stale body) mismatches the data
/// checksum; the read evicts the entry, retries the direct read once, and
/// succeeds.
#[test]
fn stale_chunk_cache_entry_is_evicted_and_retried() {
    let (image, checksum) = build_block(b"fresh content", true);

    let mut stale = image.clone();
    let body = PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE;
    stale[body] ^= 0xff;

    let cache = Arc::new(MemChunkCache::new(1 << 20));
    cache.ingest(0, 0, &stale);

    let bm = manager_for(image.clone()).with_chunk_cache(cache.clone());
    let session = Session::new();
    let mut buf = Buf::new();
    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();

    let mut expected = image;
    BlockHeader::zero_checksum(&mut expected);
    assert_eq!(buf.as_slice(), expected.as_slice());
    assert_eq!(cache.used(), 0);
    assert!(!bm.corruption_latch().is_set());
}

/// When the direct retry also mismatches, it is corruption.
#[test]
fn second_checksum_mismatch_is_corruption() {
    let (image, checksum) = build_block(b"fresh content", true);
    let mut corrupt = image.clone();
    corrupt[PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE] ^= 0xff;

    let cache = Arc::new(MemChunkCache::new(1 << 20));
    cache.ingest(0, 0, &corrupt);

    // The file itself is corrupted too, so the retry cannot help.
    let bm = BlockManager::new(Block::new(
        "test.bdb",
        0,
        ALLOC_SIZE,
        Box::new(VecBlockFile::new(corrupt)),
    ))
    .with_chunk_cache(cache);
    let session = Session::new();
    let mut buf = Buf::new();

    let err = bm
        .read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    assert!(bm.corruption_latch().is_set());
}

struct RecordingThrottle {
    calls: Mutex<Vec<(u64, ThrottleOp)>>,
}

impl CapacityThrottle for RecordingThrottle {
    fn throttle(&self, bytes: u64, op: ThrottleOp) {
        self.calls.lock().push((bytes, op));
    }
}

#[test]
fn throttle_sees_every_read() {
    let (image, checksum) = build_block(b"throttled", true);
    let throttle = Arc::new(RecordingThrottle {
        calls: Mutex::new(Vec::new()),
    });
    let bm = manager_for(image.clone()).with_throttle(throttle.clone());
    let session = Session::new();

    let mut buf = Buf::new();
    bm.read(&session, &mut buf, &cookie(0, 0, &image, checksum))
        .unwrap();

    let calls = throttle.calls.lock();
    assert_eq!(calls.as_slice(), &[(image.len() as u64, ThrottleOp::Read)]);
}

/// Multi-object managers resolve cookies through the handle cache; the
/// handle is released exactly once per read, success or failure.
#[test]
fn multi_object_handles_are_released_on_every_path() {
    let (primary, primary_sum) = build_block(b"object zero", true);
    let (secondary, secondary_sum) = build_block(b"object seven", true);

    let mut bm = manager_for(primary.clone());
    bm.add_object(Block::new(
        "obj7.bdb",
        7,
        ALLOC_SIZE,
        Box::new(VecBlockFile::new(secondary.clone())),
    ));
    let session = Session::new();

    let mut buf = Buf::new();
    bm.read(&session, &mut buf, &cookie(7, 0, &secondary, secondary_sum))
        .unwrap();
    assert_eq!(bm.handle_refs(7), 0);

    // The primary still resolves directly.
    bm.read(&session, &mut buf, &cookie(0, 0, &primary, primary_sum))
        .unwrap();

    // Failure path: corrupt cookie checksum against object 7.
    let err = bm
        .read(&session, &mut buf, &cookie(7, 0, &secondary, secondary_sum ^ 1))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    assert_eq!(bm.handle_refs(7), 0);

    // Unknown objects are not found.
    let err = bm
        .read(&session, &mut buf, &cookie(9, 0, &secondary, secondary_sum))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::NotFound));
}

#[test]
fn blind_read_reports_header_fields() {
    let (image, checksum) = build_block(b"blind", true);
    let size = image.len() as u32;
    let bm = manager_for(image);

    let (disk_size, header_checksum) = bm.read_blind(0).unwrap();
    assert_eq!(disk_size, size);
    assert_eq!(header_checksum, checksum);
}

#[test]
fn corrupt_api_reads_and_dumps() {
    let (image, checksum) = build_block(b"dump me", true);
    let bm = manager_for(image.clone());
    let session = Session::new();

    bm.corrupt(&session, &cookie(0, 0, &image, checksum))
        .unwrap();
}

/// Blocks at non-zero offsets resolve through the cookie's file offset.
#[test]
fn reads_at_offsets_within_an_object() {
    let (first, _) = build_block(b"first block", true);
    let (second, second_sum) = build_block(b"second block", true);

    let mut file = first.clone();
    file.extend_from_slice(&second);
    let bm = manager_for(file);
    let session = Session::new();

    let mut buf = Buf::new();
    bm.read(
        &session,
        &mut buf,
        &cookie(0, first.len() as u64, &second, second_sum),
    )
    .unwrap();

    let mut expected = second;
    BlockHeader::zero_checksum(&mut expected);
    assert_eq!(buf.as_slice(), expected.as_slice());
}
