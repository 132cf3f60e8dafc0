//! Heap regions as seen by the mark map.
//!
//! The mark map never owns or mutates regions. It only walks them to decide
//! which bitmap ranges back committed memory.

/// A span of heap address space, committed or not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapRegion {
    low_address: usize,
    size: usize,
    committed: bool,
}

impl HeapRegion {
    /// A committed region `[low_address, low_address + size)`.
    #[must_use]
    pub const fn committed(low_address: usize, size: usize) -> Self {
        Self {
            low_address,
            size,
            committed: true,
        }
    }

    /// A reserved but uncommitted region.
    #[must_use]
    pub const fn uncommitted(low_address: usize, size: usize) -> Self {
        Self {
            low_address,
            size,
            committed: false,
        }
    }

    /// Lowest address in the region.
    #[must_use]
    pub const fn low_address(&self) -> usize {
        self.low_address
    }

    /// One past the highest address in the region.
    #[must_use]
    pub const fn high_address(&self) -> usize {
        self.low_address + self.size
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether the region is backed by committed memory.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }
}

/// Read-only view of the heap's region table.
pub trait RegionManager {
    /// Every region, committed or not, in address order.
    fn regions(&self) -> impl Iterator<Item = HeapRegion> + '_;

    /// Total committed heap bytes. Drives the clear work-unit size.
    fn memory_size(&self) -> usize {
        self.regions()
            .filter(HeapRegion::is_committed)
            .map(|r| r.size())
            .sum()
    }

    /// Alignment that work-unit sizes are rounded up to.
    fn heap_alignment(&self) -> usize;
}

/// A flat, vector-backed region table.
#[derive(Clone, Debug, Default)]
pub struct HeapLayout {
    regions: Vec<HeapRegion>,
    alignment: usize,
}

impl HeapLayout {
    /// Create an empty layout whose work units round up to `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is zero.
    #[must_use]
    pub fn new(alignment: usize) -> Self {
        assert!(alignment > 0, "heap alignment must be non-zero");
        Self {
            regions: Vec::new(),
            alignment,
        }
    }

    /// Append a region. Regions must be added in address order and must not
    /// overlap.
    ///
    /// # Panics
    ///
    /// Panics if `region` starts below the end of the previous region.
    pub fn push(&mut self, region: HeapRegion) {
        if let Some(prev) = self.regions.last() {
            assert!(
                region.low_address() >= prev.high_address(),
                "region {:#x} overlaps previous region ending at {:#x}",
                region.low_address(),
                prev.high_address()
            );
        }
        self.regions.push(region);
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with_region(mut self, region: HeapRegion) -> Self {
        self.push(region);
        self
    }

    /// Flip a region's committed state, as a region manager would on
    /// expand or contract.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_committed(&mut self, index: usize, committed: bool) {
        self.regions[index].committed = committed;
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// `true` if there are no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl RegionManager for HeapLayout {
    fn regions(&self) -> impl Iterator<Item = HeapRegion> + '_ {
        self.regions.iter().copied()
    }

    fn heap_alignment(&self) -> usize {
        self.alignment
    }
}
