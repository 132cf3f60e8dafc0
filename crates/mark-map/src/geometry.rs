//! Address arithmetic for the mark map.
//!
//! One bit covers one granule of `G` heap bytes, and one machine word holds
//! `W` bits, so a word covers `W * G` bytes. With `bit_shift = log2(G)` and
//! `word_shift = bit_shift + log2(W)`:
//!
//! ```text
//! slot      = addr - base_delta
//! word      = slot >> word_shift
//! bit       = (slot >> bit_shift) & (W - 1)
//! address   = base_delta + ((word * W + bit) << bit_shift)
//! ```
//!
//! All mapping is shift-and-mask; there is no division on the hot path.

use crate::error::{MarkMapError, Result};

/// Number of mark bits held in one storage word.
pub const BITS_PER_WORD: usize = usize::BITS as usize;

/// `log2(BITS_PER_WORD)`.
pub const LOG2_BITS_PER_WORD: u32 = usize::BITS.trailing_zeros();

/// Position of a mark bit: the storage word and the bit within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitIndex {
    /// Index of the storage word.
    pub word: usize,
    /// Bit position inside the word, `0..BITS_PER_WORD`.
    pub bit: u32,
}

impl BitIndex {
    /// Single-bit mask for this position.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> usize {
        1 << self.bit
    }
}

/// Which end of a word a boundary mask covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockEnd {
    /// Bits `[0, bit]`: the tail of a range that ends inside the word.
    Low,
    /// Bits `[bit, W - 1]`: the head of a range that starts inside the word.
    High,
}

/// Immutable granule geometry, built once and shared by the bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    base_delta: usize,
    granule_size: usize,
    bit_shift: u32,
    word_shift: u32,
}

impl Geometry {
    /// Create a geometry for `granule_size` bytes per bit with bit 0 at
    /// `base_delta`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkMapError::InvalidGranule`] if `granule_size` is not a
    /// power of two, and [`MarkMapError::MisalignedBase`] if `base_delta` does
    /// not start on a word boundary.
    pub fn new(base_delta: usize, granule_size: usize) -> Result<Self> {
        if !granule_size.is_power_of_two() {
            return Err(MarkMapError::InvalidGranule(granule_size));
        }
        let bit_shift = granule_size.trailing_zeros();
        let word_shift = bit_shift + LOG2_BITS_PER_WORD;
        if word_shift >= usize::BITS {
            return Err(MarkMapError::InvalidGranule(granule_size));
        }

        let geometry = Self {
            base_delta,
            granule_size,
            bit_shift,
            word_shift,
        };
        if base_delta & (geometry.word_coverage() - 1) != 0 {
            return Err(MarkMapError::MisalignedBase {
                base: base_delta,
                word_coverage: geometry.word_coverage(),
            });
        }
        Ok(geometry)
    }

    /// Heap address represented by bit 0 of word 0.
    #[inline]
    #[must_use]
    pub const fn base_delta(&self) -> usize {
        self.base_delta
    }

    /// Heap bytes per mark bit.
    #[inline]
    #[must_use]
    pub const fn granule_size(&self) -> usize {
        self.granule_size
    }

    /// `log2(granule_size)`.
    #[inline]
    #[must_use]
    pub const fn bit_shift(&self) -> u32 {
        self.bit_shift
    }

    /// `log2(granule_size * BITS_PER_WORD)`.
    #[inline]
    #[must_use]
    pub const fn word_shift(&self) -> u32 {
        self.word_shift
    }

    /// Heap bytes covered by one storage word.
    #[inline]
    #[must_use]
    pub const fn word_coverage(&self) -> usize {
        1 << self.word_shift
    }

    /// Number of words needed to cover `heap_size` bytes, rounded up.
    #[must_use]
    pub const fn words_for(&self, heap_size: usize) -> usize {
        self.offset_to_word_ceil(heap_size)
    }

    /// Map a heap address to its mark bit.
    ///
    /// `addr` must lie at or above `base_delta`. Addresses inside the same
    /// granule map to the same bit.
    #[inline]
    #[must_use]
    pub const fn address_to_index(&self, addr: usize) -> BitIndex {
        debug_assert!(addr >= self.base_delta);
        let slot = addr - self.base_delta;
        BitIndex {
            word: slot >> self.word_shift,
            #[allow(clippy::cast_possible_truncation)]
            bit: ((slot >> self.bit_shift) & (BITS_PER_WORD - 1)) as u32,
        }
    }

    /// Address of the granule represented by bit 0 of `word`.
    #[inline]
    #[must_use]
    pub const fn index_to_address(&self, word: usize) -> usize {
        self.base_delta + (word << self.word_shift)
    }

    /// Address of the granule represented by `index`.
    #[inline]
    #[must_use]
    pub const fn bit_address(&self, index: BitIndex) -> usize {
        self.index_to_address(index.word) + ((index.bit as usize) << self.bit_shift)
    }

    /// Round `addr` down to the start of its granule.
    #[inline]
    #[must_use]
    pub const fn granule_floor(&self, addr: usize) -> usize {
        addr & !(self.granule_size - 1)
    }

    /// Word index and boundary mask for the word containing `addr`.
    ///
    /// [`BlockEnd::Low`] covers bits `[0, bit]`, [`BlockEnd::High`] covers
    /// bits `[bit, W - 1]`. Both include the bit of `addr` itself, so a range
    /// starting and ending in the same word must intersect the two masks.
    #[inline]
    #[must_use]
    pub const fn block_mask(&self, addr: usize, end: BlockEnd) -> (usize, usize) {
        let index = self.address_to_index(addr);
        let mask = match end {
            BlockEnd::Low => usize::MAX >> (BITS_PER_WORD as u32 - 1 - index.bit),
            BlockEnd::High => usize::MAX << index.bit,
        };
        (index.word, mask)
    }

    /// Convert a heap offset (bytes from `base_delta`) to a word index,
    /// rounding up to the next word boundary.
    ///
    /// Used for both ends of a clear chunk so adjacent chunks agree on the
    /// word that separates them.
    #[inline]
    #[must_use]
    pub const fn offset_to_word_ceil(&self, offset: usize) -> usize {
        let partial = (offset & (self.word_coverage() - 1) != 0) as usize;
        (offset >> self.word_shift) + partial
    }
}
