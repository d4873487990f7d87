//! # Page Allocator
//!
//! Region-backed allocator for B-tree page memory. Pages are handles into
//! region slots rather than raw pointers: the allocator owns all memory, a
//! [`PageHandle`] names a slot, and data access goes through the allocator.
//! Handles are move-only, so a freed page cannot be referenced again without
//! tripping the borrow checker first.
//!
//! ## Allocation Strategy
//!
//! `alloc_page` scans live regions for one with a free slot and enough
//! remaining room; failing that it appends a region of capacity
//! `max(region_size, size)`. `zalloc` targets the owning page's region and
//! spills into exactly one fresh region when the request no longer fits.
//!
//! ## Failure Mode
//!
//! Running out of regions is a distinct error; the allocator never hands out
//! a partially-initialised page (all page and spill memory is zeroed).

use eyre::{bail, ensure, Result};

use super::region::{PageSlot, Region, SpillAlloc};
use crate::config::{ALLOC_MAP_FREE, ALLOC_REGION_COUNT, ALLOC_REGION_SIZE};

/// Names an allocated page. Move-only: `free_page` consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct PageHandle {
    region: usize,
    slot: usize,
}

impl PageHandle {
    /// Region index this page occupies; exposed for diagnostics.
    pub fn region(&self) -> usize {
        self.region
    }
}

/// Names one spill allocation owned by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillHandle {
    region: usize,
    slot: usize,
    index: usize,
}

pub struct PageAllocator {
    region_size: usize,
    max_regions: usize,
    /// Index-stable region list; released regions leave a `None` behind so
    /// outstanding handles keep their indices.
    regions: Vec<Option<Region>>,
    /// One bitmap byte per region position, 1 = slot free. Stays `0xff` for
    /// absent regions, which is also what a fully-free region shows.
    region_map: Vec<u8>,
    active_regions: usize,
    live_pages: usize,
}

impl PageAllocator {
    /// Allocator with the default region geometry.
    pub fn new() -> Self {
        Self::with_config(ALLOC_REGION_SIZE, ALLOC_REGION_COUNT)
            .expect("default allocator geometry is valid")
    }

    /// Allocator with an explicit region byte-size and region cap.
    pub fn with_config(region_size: usize, region_count: usize) -> Result<Self> {
        ensure!(region_size > 0, "region size must be non-zero");
        ensure!(region_count > 0, "region count must be non-zero");
        Ok(Self {
            region_size,
            max_regions: region_count,
            regions: Vec::new(),
            region_map: vec![ALLOC_MAP_FREE; region_count],
            active_regions: 0,
            live_pages: 0,
        })
    }

    /// Number of live regions.
    pub fn region_count(&self) -> usize {
        self.active_regions
    }

    /// Slot bitmap, one byte per region position (1 = free).
    pub fn region_map(&self) -> &[u8] {
        &self.region_map
    }

    /// Number of outstanding pages.
    pub fn live_pages(&self) -> usize {
        self.live_pages
    }

    /// Allocates a page of at least `size` bytes.
    pub fn alloc_page(&mut self, size: usize) -> Result<PageHandle> {
        let region = match self.find_region(size) {
            Some(idx) => idx,
            None => self.add_region(self.region_size.max(size))?,
        };

        let map = &mut self.region_map[region];
        let slot = map.trailing_zeros() as usize;
        *map &= !(1 << slot);

        let r = self.regions[region].as_mut().expect("region is live");
        r.reserve(size);
        r.place(slot, PageSlot::new(size));
        self.live_pages += 1;

        Ok(PageHandle { region, slot })
    }

    /// Allocates `bytes` of zeroed memory owned by `page`. A zero-byte
    /// request returns the null sentinel without failing. Oversized requests
    /// spill into exactly one freshly added region.
    pub fn zalloc(&mut self, bytes: usize, page: &PageHandle) -> Result<Option<SpillHandle>> {
        if bytes == 0 {
            return Ok(None);
        }

        let owner = self.regions[page.region]
            .as_ref()
            .expect("page handle names a live region");
        let home_region = if owner.remaining() >= bytes {
            page.region
        } else {
            self.add_region(self.region_size.max(bytes))?
        };

        self.regions[home_region]
            .as_mut()
            .expect("home region is live")
            .reserve(bytes);

        let slot = self.regions[page.region]
            .as_mut()
            .expect("page handle names a live region")
            .slot_mut(page.slot)
            .expect("page handle names an occupied slot");
        slot.spill.push(SpillAlloc {
            home_region,
            data: vec![0u8; bytes].into_boxed_slice(),
        });

        Ok(Some(SpillHandle {
            region: page.region,
            slot: page.slot,
            index: slot.spill.len() - 1,
        }))
    }

    /// Releases the page's slot and every spill allocation it owns. Regions
    /// left with no occupied slots and no outstanding bytes are released
    /// immediately.
    pub fn free_page(&mut self, page: PageHandle) {
        let slot = self.regions[page.region]
            .as_mut()
            .expect("page handle names a live region")
            .take(page.slot);

        self.region_map[page.region] |= 1 << page.slot;
        self.regions[page.region]
            .as_mut()
            .expect("page region is live")
            .release(slot.data.len());

        for spill in &slot.spill {
            self.regions[spill.home_region]
                .as_mut()
                .expect("spill home region is live")
                .release(spill.data.len());
            self.maybe_release_region(spill.home_region);
        }
        self.maybe_release_region(page.region);
        self.live_pages -= 1;
    }

    /// Page memory for an outstanding handle.
    pub fn page_data(&self, page: &PageHandle) -> &[u8] {
        &self
            .regions[page.region]
            .as_ref()
            .expect("page handle names a live region")
            .slot(page.slot)
            .expect("page handle names an occupied slot")
            .data
    }

    pub fn page_data_mut(&mut self, page: &PageHandle) -> &mut [u8] {
        &mut self
            .regions[page.region]
            .as_mut()
            .expect("page handle names a live region")
            .slot_mut(page.slot)
            .expect("page handle names an occupied slot")
            .data
    }

    /// Spill memory for an outstanding handle.
    pub fn spill(&self, spill: &SpillHandle) -> &[u8] {
        &self
            .regions[spill.region]
            .as_ref()
            .expect("spill handle names a live region")
            .slot(spill.slot)
            .expect("spill handle names an occupied slot")
            .spill[spill.index]
            .data
    }

    pub fn spill_mut(&mut self, spill: &SpillHandle) -> &mut [u8] {
        &mut self
            .regions[spill.region]
            .as_mut()
            .expect("spill handle names a live region")
            .slot_mut(spill.slot)
            .expect("spill handle names an occupied slot")
            .spill[spill.index]
            .data
    }

    fn find_region(&self, size: usize) -> Option<usize> {
        (0..self.regions.len()).find(|&idx| {
            matches!(&self.regions[idx], Some(region)
                if self.region_map[idx] != 0 && region.remaining() >= size)
        })
    }

    fn add_region(&mut self, capacity: usize) -> Result<usize> {
        if self.active_regions == self.max_regions {
            bail!(
                "page allocator out of regions (max {})",
                self.max_regions
            );
        }

        let idx = match self.regions.iter().position(Option::is_none) {
            Some(idx) => {
                self.regions[idx] = Some(Region::new(capacity));
                idx
            }
            None => {
                self.regions.push(Some(Region::new(capacity)));
                self.regions.len() - 1
            }
        };
        self.active_regions += 1;
        Ok(idx)
    }

    fn maybe_release_region(&mut self, idx: usize) {
        let idle = match &self.regions[idx] {
            Some(region) => region.used() == 0 && self.region_map[idx] == ALLOC_MAP_FREE,
            None => false,
        };
        if idle {
            self.regions[idx] = None;
            self.active_regions -= 1;
        }
    }
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageAllocator {
    fn drop(&mut self) {
        debug_assert!(
            self.live_pages == 0,
            "page allocator destroyed with {} outstanding pages",
            self.live_pages
        );
    }
}
