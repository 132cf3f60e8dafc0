//! Mark map configuration.

use crate::error::{MarkMapError, Result};
use crate::geometry::{Geometry, BITS_PER_WORD};

/// Default bytes per mark bit (one pointer-aligned slot on 64-bit targets).
pub const DEFAULT_GRANULE_SIZE: usize = 8;

/// Default maximum heap covered by the bitmap.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 1 << 30;

/// Where the bitmap words live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageKind {
    /// A boxed slice from the global allocator.
    Heap,
    /// An anonymous zero-filled mapping from `sys_alloc`.
    #[default]
    Mapped,
}

/// Configuration for a [`MarkMap`](crate::MarkMap).
///
/// Geometry is fixed once the bitmap is built; there is no way to resize or
/// re-base it afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkMapConfig {
    /// Largest heap the bitmap must cover, in bytes.
    pub max_heap_size: usize,
    /// Heap address represented by bit 0.
    pub heap_base: usize,
    /// Heap bytes per mark bit. Must be a power of two.
    pub granule_size: usize,
    /// Heap bytes per card. Must equal `granule_size * BITS_PER_WORD`.
    pub card_size: usize,
    /// Storage backing.
    pub storage: StorageKind,
}

impl Default for MarkMapConfig {
    fn default() -> Self {
        Self {
            max_heap_size: DEFAULT_MAX_HEAP_SIZE,
            heap_base: 0,
            granule_size: DEFAULT_GRANULE_SIZE,
            card_size: DEFAULT_GRANULE_SIZE * BITS_PER_WORD,
            storage: StorageKind::default(),
        }
    }
}

impl MarkMapConfig {
    /// Create a configuration covering `max_heap_size` bytes with default
    /// granule and card sizes.
    #[must_use]
    pub fn new(max_heap_size: usize) -> Self {
        Self {
            max_heap_size,
            ..Default::default()
        }
    }

    /// Set the heap base (the address of bit 0).
    #[must_use]
    pub const fn with_heap_base(mut self, heap_base: usize) -> Self {
        self.heap_base = heap_base;
        self
    }

    /// Set the granule size and derive the matching card size.
    #[must_use]
    pub const fn with_granule_size(mut self, granule_size: usize) -> Self {
        self.granule_size = granule_size;
        self.card_size = granule_size.saturating_mul(BITS_PER_WORD);
        self
    }

    /// Override the card size. [`validate`](Self::validate) rejects any value
    /// that is not exactly one word's coverage.
    #[must_use]
    pub const fn with_card_size(mut self, card_size: usize) -> Self {
        self.card_size = card_size;
        self
    }

    /// Choose the storage backing.
    #[must_use]
    pub const fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Check the configuration and build its geometry.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found: zero heap size, bad
    /// granule, misaligned base, a heap that overflows the address space, or
    /// a card size that is not one word's coverage.
    pub fn validate(&self) -> Result<Geometry> {
        if self.max_heap_size == 0 {
            return Err(MarkMapError::ZeroHeapSize);
        }
        let geometry = Geometry::new(self.heap_base, self.granule_size)?;
        if self.heap_base.checked_add(self.max_heap_size).is_none() {
            return Err(MarkMapError::AddressOverflow {
                base: self.heap_base,
                max_heap_size: self.max_heap_size,
            });
        }
        if self.card_size != geometry.word_coverage() {
            return Err(MarkMapError::CardSizeMismatch {
                card_size: self.card_size,
                word_coverage: geometry.word_coverage(),
            });
        }
        Ok(geometry)
    }

    /// Number of storage words this configuration needs.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn word_count(&self) -> Result<usize> {
        Ok(self.validate()?.words_for(self.max_heap_size))
    }
}
