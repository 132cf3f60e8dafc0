//! Construction errors.
//!
//! Every error here is fatal to collector startup. Nothing in the marking,
//! card query or clear paths returns an error; those rely on assertions.

use thiserror::Error;

/// Errors raised while configuring or allocating a [`MarkMap`](crate::MarkMap).
#[derive(Debug, Error)]
pub enum MarkMapError {
    /// The granule size is zero or not a power of two.
    #[error("granule size {0} must be a non-zero power of two")]
    InvalidGranule(usize),

    /// The maximum heap size is zero.
    #[error("maximum heap size must be greater than zero")]
    ZeroHeapSize,

    /// The heap base is not aligned to the heap span covered by one word.
    #[error("heap base {base:#x} is not aligned to the {word_coverage}-byte span of one bitmap word")]
    MisalignedBase {
        /// Configured heap base.
        base: usize,
        /// Bytes of heap covered by one bitmap word.
        word_coverage: usize,
    },

    /// One card does not map to exactly one bitmap word.
    #[error("card size {card_size} does not match the {word_coverage}-byte span of one bitmap word")]
    CardSizeMismatch {
        /// Configured card size in bytes.
        card_size: usize,
        /// Bytes of heap covered by one bitmap word.
        word_coverage: usize,
    },

    /// The heap size overflows address arithmetic.
    #[error("heap of {max_heap_size} bytes at base {base:#x} overflows the address space")]
    AddressOverflow {
        /// Configured heap base.
        base: usize,
        /// Configured maximum heap size.
        max_heap_size: usize,
    },

    /// The memory manager could not provide the bitmap storage.
    #[error("failed to allocate {words} bitmap words")]
    StorageAllocation {
        /// Number of words requested.
        words: usize,
        /// Underlying allocation failure.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for mark map construction.
pub type Result<T> = std::result::Result<T, MarkMapError>;
