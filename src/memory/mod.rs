//! # Region Page Allocator
//!
//! This module owns page memory for the B-tree layer. Memory is carved into
//! fixed-capacity regions, each split into equal page slots; a page slot owns
//! the page bytes plus every spill allocation made on the page's behalf, so
//! freeing the page releases everything it ever allocated in one step.
//!
//! ## Layout
//!
//! ```text
//! PageAllocator
//! ├── region_map: [u8; region_count]   one bitmap byte per region (1 = free)
//! ├── Region 0 (capacity = region_size)
//! │     ├── slot 0: PageSlot { page bytes, spill allocations }
//! │     ├── slot 1: free
//! │     └── ... 8 slots total
//! ├── Region 1
//! └── ...
//! ```
//!
//! A region freshly claimed by one page shows `0xfe` in its bitmap byte;
//! fully free is `0xff`.
//!
//! ## Spill Allocations
//!
//! `zalloc` requests are accounted against the owning page's region. When a
//! request no longer fits in that region's remaining room, the allocator
//! spills into exactly one freshly added region sized to the request. The
//! spilled memory still belongs to the page: `free_page` credits the spill's
//! home region and releases it once idle.
//!
//! ## Lifecycle
//!
//! - Pages are allocated on B-tree demand and freed when the page is evicted.
//! - A region with no occupied slots and no outstanding bytes is released
//!   immediately; its bitmap byte resets to `0xff`.
//! - Dropping the allocator asserts that no pages are outstanding.
//!
//! ## Thread Safety
//!
//! `PageAllocator` takes `&mut self` and is not internally synchronized.
//! Callers serialize access with a `parking_lot::Mutex` (the region-list
//! lock), the same discipline the tree layer uses for its own structures.

mod allocator;
mod region;

pub use allocator::{PageAllocator, PageHandle, SpillHandle};
