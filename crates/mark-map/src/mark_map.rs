//! The mark map: one bit per heap granule.
//!
//! Storage is shared by every collector thread for the length of a task.
//! Access falls into two regimes that must never overlap on the same word:
//!
//! - concurrent marking, where threads may race on one word and must go
//!   through [`MarkMap::atomic_set_bits`];
//! - exclusive ranges (clear, sweep), where the caller owns a word range and
//!   may use [`MarkMap::bulk_set_words`] and plain loads.
//!
//! The bitmap does not provide the barrier between the two; the task that
//! drives it does.

use crate::config::{MarkMapConfig, StorageKind};
use crate::error::Result;
use crate::geometry::{BitIndex, BlockEnd, Geometry};
use crate::storage::WordStorage;
use crate::sync::{AtomicBool, AtomicUsize, Ordering};

/// Liveness bitmap covering a fixed maximum heap.
///
/// # Example
///
/// ```
/// use mark_map::{MarkMap, MarkMapConfig};
///
/// let map = MarkMap::new(&MarkMapConfig::new(1 << 20).with_heap_base(0x1000_0000)).unwrap();
/// assert!(!map.is_marked(0x1000_0040));
///
/// assert!(map.mark(0x1000_0040));
/// assert!(map.is_marked(0x1000_0040));
/// assert!(map.has_live_objects(0x1000_0000));
/// ```
#[derive(Debug)]
pub struct MarkMap {
    geometry: Geometry,
    storage: WordStorage,
    max_heap_size: usize,
    /// Set by the mark orchestrator once a full mark pass has completed.
    valid: AtomicBool,
}

impl MarkMap {
    /// Build a zeroed mark map for `config`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration (including a card size that does not
    /// match one word's coverage) or if the storage cannot be allocated.
    /// Either case is fatal to collector startup.
    pub fn new(config: &MarkMapConfig) -> Result<Self> {
        let geometry = config.validate()?;
        let words = geometry.words_for(config.max_heap_size);
        let storage = WordStorage::allocate(config.storage, words)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            words,
            granule_size = geometry.granule_size(),
            heap_base = geometry.base_delta(),
            storage = ?config.storage,
            "mark_map_created"
        );

        Ok(Self {
            geometry,
            storage,
            max_heap_size: config.max_heap_size,
            valid: AtomicBool::new(false),
        })
    }

    /// The address geometry.
    #[inline]
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Heap address of bit 0.
    #[inline]
    #[must_use]
    pub const fn base_delta(&self) -> usize {
        self.geometry.base_delta()
    }

    /// Maximum heap size this bitmap was sized for.
    #[must_use]
    pub const fn max_heap_size(&self) -> usize {
        self.max_heap_size
    }

    /// Number of storage words.
    #[inline]
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.storage.len()
    }

    /// Heap bytes covered by the whole storage (a whole number of words).
    #[must_use]
    pub fn coverage(&self) -> usize {
        self.storage.len() << self.geometry.word_shift()
    }

    /// Which memory manager backs the storage.
    #[must_use]
    pub const fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    pub(crate) const fn storage(&self) -> &WordStorage {
        &self.storage
    }

    #[inline]
    fn slot(&self, word: usize) -> &AtomicUsize {
        &self.storage.words()[word]
    }

    // =========================================================================
    // Validity
    // =========================================================================

    /// Whether the contents reflect a completed mark pass.
    ///
    /// Consumers that need exact liveness must fall back to "assume live"
    /// when this is false.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Record whether the contents reflect a completed mark pass.
    ///
    /// Only the mark orchestrator sets this to `true`. Clearing resets it.
    pub fn set_valid(&self, valid: bool) {
        #[cfg(feature = "tracing")]
        tracing::trace!(valid, "mark_map_validity");
        self.valid.store(valid, Ordering::Release);
    }

    // =========================================================================
    // Geometry passthroughs
    // =========================================================================

    /// Mark bit for `addr`.
    #[inline]
    #[must_use]
    pub const fn address_to_index(&self, addr: usize) -> BitIndex {
        self.geometry.address_to_index(addr)
    }

    /// Word index and boundary mask for the word containing `addr`.
    #[inline]
    #[must_use]
    pub const fn block_mask(&self, addr: usize, end: BlockEnd) -> (usize, usize) {
        self.geometry.block_mask(addr, end)
    }

    /// Address of the granule represented by bit 0 of `word`.
    ///
    /// Sweep uses this to turn a set bit back into an object address.
    #[inline]
    #[must_use]
    pub const fn word_address(&self, word: usize) -> usize {
        self.geometry.index_to_address(word)
    }

    // =========================================================================
    // Word access
    // =========================================================================

    /// Load one word.
    ///
    /// # Panics
    ///
    /// Panics if `word` is out of range.
    #[inline]
    #[must_use]
    pub fn word(&self, word: usize) -> usize {
        self.slot(word).load(Ordering::Relaxed)
    }

    /// Iterate over every word's current value, in index order.
    pub fn words(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.storage
            .words()
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
    }

    /// Atomically OR `mask` into `word`, returning the previous value.
    ///
    /// Safe for any number of concurrent callers on the same word: the final
    /// value is the union of every mask applied, whatever the interleaving.
    ///
    /// # Panics
    ///
    /// Panics if `word` is out of range.
    #[inline]
    pub fn atomic_set_bits(&self, word: usize, mask: usize) -> usize {
        let slot = self.slot(word);
        let mut old = slot.load(Ordering::Relaxed);
        loop {
            let new = old | mask;
            if new == old {
                return old;
            }
            match slot.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(prev) => return prev,
                Err(current) => old = current,
            }
        }
    }

    /// Store `value` into every word in `low..=high`.
    ///
    /// The caller must own the range exclusively: no concurrent
    /// [`atomic_set_bits`](Self::atomic_set_bits) or bulk store may touch
    /// these words for the duration of the call. An empty range
    /// (`low > high`) does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `high` is out of range.
    pub fn bulk_set_words(&self, low: usize, high: usize, value: usize) {
        if low > high {
            return;
        }
        for slot in &self.storage.words()[low..=high] {
            slot.store(value, Ordering::Relaxed);
        }
    }

    /// Zero every word and drop validity.
    ///
    /// This is the full-bitmap reset; prefer the parallel clear, which only
    /// touches committed regions.
    pub fn clear_all(&self) {
        self.set_valid(false);
        if let Some(last) = self.word_count().checked_sub(1) {
            self.bulk_set_words(0, last, 0);
        }
    }

    // =========================================================================
    // Object-level marking
    // =========================================================================

    /// Mark the granule containing `addr`. Returns `true` if this call set
    /// the bit.
    #[inline]
    pub fn mark(&self, addr: usize) -> bool {
        let index = self.address_to_index(addr);
        self.atomic_set_bits(index.word, index.mask()) & index.mask() == 0
    }

    /// Whether the granule containing `addr` is marked.
    #[inline]
    #[must_use]
    pub fn is_marked(&self, addr: usize) -> bool {
        let index = self.address_to_index(addr);
        self.word(index.word) & index.mask() != 0
    }

    /// First word, its mask, last word and its mask for the granules in
    /// `[low, high)`. The masks are intersected when both ends share a word.
    fn range_masks(&self, low: usize, high: usize) -> Option<(usize, usize, usize, usize)> {
        if low >= high {
            return None;
        }
        let (first, head) = self.block_mask(low, BlockEnd::High);
        let (last, tail) = self.block_mask(high - 1, BlockEnd::Low);
        if first == last {
            let both = head & tail;
            Some((first, both, last, both))
        } else {
            Some((first, head, last, tail))
        }
    }

    /// Mark every granule overlapping `[low, high)`.
    ///
    /// Uses the atomic path for every word, so it may race with other markers.
    pub fn mark_range(&self, low: usize, high: usize) {
        let Some((first, head, last, tail)) = self.range_masks(low, high) else {
            return;
        };
        self.atomic_set_bits(first, head);
        if first != last {
            for word in first + 1..last {
                self.atomic_set_bits(word, usize::MAX);
            }
            self.atomic_set_bits(last, tail);
        }
    }

    /// Whether any granule overlapping `[low, high)` is marked.
    #[must_use]
    pub fn any_marked_in_range(&self, low: usize, high: usize) -> bool {
        let Some((first, head, last, tail)) = self.range_masks(low, high) else {
            return false;
        };
        if self.word(first) & head != 0 {
            return true;
        }
        if first == last {
            return false;
        }
        (first + 1..last).any(|word| self.word(word) != 0) || self.word(last) & tail != 0
    }

    /// Number of marked granules in `[low, high)`.
    #[must_use]
    pub fn count_marked_in_range(&self, low: usize, high: usize) -> usize {
        let Some((first, head, last, tail)) = self.range_masks(low, high) else {
            return 0;
        };
        let mut count = (self.word(first) & head).count_ones() as usize;
        if first != last {
            count += (first + 1..last)
                .map(|word| self.word(word).count_ones() as usize)
                .sum::<usize>();
            count += (self.word(last) & tail).count_ones() as usize;
        }
        count
    }

    /// Addresses of every marked granule in word order, for sweep.
    pub fn marked_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.words().enumerate().flat_map(move |(word, bits)| {
            let base = self.word_address(word);
            let shift = self.geometry.bit_shift();
            SetBits(bits).map(move |bit| base + ((bit as usize) << shift))
        })
    }

    // =========================================================================
    // Cards
    // =========================================================================

    /// Whether the card starting at `card_address` holds any marked granule.
    ///
    /// A card is exactly one word's coverage (enforced at construction), so
    /// this is a single load. `card_address` must be card aligned and the
    /// card must lie inside one committed region.
    #[inline]
    #[must_use]
    pub fn has_live_objects(&self, card_address: usize) -> bool {
        debug_assert_eq!(
            (card_address - self.base_delta()) & (self.geometry.word_coverage() - 1),
            0,
            "card address {card_address:#x} is not card aligned"
        );
        self.word(self.address_to_index(card_address).word) != 0
    }
}

/// Iterator over set bit positions of a word, lowest first.
struct SetBits(usize);

impl Iterator for SetBits {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(bit)
    }
}
