//! Fixed-size word storage for the mark map.
//!
//! The storage is allocated once, zero-filled, and never resized. Callers
//! only ever see it as `&[AtomicUsize]`, so every access is bounds checked and
//! every mutation goes through an atomic operation. The slice is rebuilt from
//! the owning backing on every access; no raw pointer outlives a borrow.

use std::io;
use std::mem::size_of;

#[cfg(not(loom))]
use sys_alloc::{Mmap, MmapOptions};

use crate::config::StorageKind;
use crate::error::{MarkMapError, Result};
use crate::sync::AtomicUsize;

/// An owned, zero-initialized array of atomic machine words.
pub enum WordStorage {
    /// Boxed slice from the global allocator.
    Heap(Box<[AtomicUsize]>),
    /// Anonymous mapping holding `len` words.
    #[cfg(not(loom))]
    Mapped {
        /// The mapping; page aligned and zero-filled.
        mmap: Mmap,
        /// Number of words in use.
        len: usize,
    },
}

impl WordStorage {
    /// Allocate `words` zeroed words from the requested backing.
    ///
    /// Under loom every request is served from the heap: loom atomics must be
    /// constructed, not read out of zeroed memory.
    ///
    /// # Errors
    ///
    /// Returns [`MarkMapError::StorageAllocation`] if the memory manager
    /// cannot satisfy the request.
    pub fn allocate(kind: StorageKind, words: usize) -> Result<Self> {
        match kind {
            StorageKind::Heap => Self::from_heap(words),
            #[cfg(not(loom))]
            StorageKind::Mapped => Self::from_mapping(words),
            #[cfg(loom)]
            StorageKind::Mapped => Self::from_heap(words),
        }
    }

    fn from_heap(words: usize) -> Result<Self> {
        let mut vec: Vec<AtomicUsize> = Vec::new();
        vec.try_reserve_exact(words)
            .map_err(|e| MarkMapError::StorageAllocation {
                words,
                source: io::Error::new(io::ErrorKind::OutOfMemory, e),
            })?;
        vec.resize_with(words, || AtomicUsize::new(0));
        Ok(Self::Heap(vec.into_boxed_slice()))
    }

    #[cfg(not(loom))]
    fn from_mapping(words: usize) -> Result<Self> {
        let bytes = words.checked_mul(size_of::<AtomicUsize>()).ok_or_else(|| {
            MarkMapError::StorageAllocation {
                words,
                source: io::Error::new(io::ErrorKind::InvalidInput, "bitmap size overflows"),
            }
        })?;

        let mmap = MmapOptions::new()
            .len(bytes)
            .no_reserve(true)
            .map_anon()
            .map_err(|source| MarkMapError::StorageAllocation { words, source })?;

        Ok(Self::Mapped { mmap, len: words })
    }

    /// The words as a bounds-checked slice.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[AtomicUsize] {
        match self {
            Self::Heap(words) => words,
            #[cfg(not(loom))]
            Self::Mapped { mmap, len } => {
                // SAFETY: the mapping is page aligned, at least `len` words
                // long, zero-filled (a valid `AtomicUsize`), and lives as long
                // as `self`. Every access goes through atomics.
                unsafe { std::slice::from_raw_parts(mmap.ptr().cast::<AtomicUsize>(), *len) }
            }
        }
    }

    /// Number of words.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Heap(words) => words.len(),
            #[cfg(not(loom))]
            Self::Mapped { len, .. } => *len,
        }
    }

    /// `true` if there are no words.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the storage in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * size_of::<AtomicUsize>()
    }

    /// Address of the first word.
    #[must_use]
    pub fn as_ptr(&self) -> *const AtomicUsize {
        self.words().as_ptr()
    }

    /// Which memory manager provided the words.
    #[must_use]
    pub const fn kind(&self) -> StorageKind {
        match self {
            Self::Heap(_) => StorageKind::Heap,
            #[cfg(not(loom))]
            Self::Mapped { .. } => StorageKind::Mapped,
        }
    }
}

impl std::fmt::Debug for WordStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordStorage")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Ordering;

    #[test]
    fn test_heap_storage_is_zeroed() {
        let storage = WordStorage::allocate(StorageKind::Heap, 100).unwrap();
        assert_eq!(storage.len(), 100);
        assert_eq!(storage.kind(), StorageKind::Heap);
        assert!(storage.words().iter().all(|w| w.load(Ordering::Relaxed) == 0));
    }

    #[test]
    fn test_mapped_storage_is_zeroed_and_writable() {
        let storage = WordStorage::allocate(StorageKind::Mapped, 4096).unwrap();
        assert_eq!(storage.kind(), StorageKind::Mapped);
        assert_eq!(storage.byte_len(), 4096 * size_of::<usize>());
        assert!(storage.words().iter().all(|w| w.load(Ordering::Relaxed) == 0));

        storage.words()[4095].store(usize::MAX, Ordering::Relaxed);
        assert_eq!(storage.words()[4095].load(Ordering::Relaxed), usize::MAX);
    }

    #[test]
    fn test_storage_survives_move() {
        let storage = WordStorage::allocate(StorageKind::Heap, 8).unwrap();
        storage.words()[3].store(7, Ordering::Relaxed);
        let moved = Box::new(storage);
        assert_eq!(moved.words()[3].load(Ordering::Relaxed), 7);
        moved.words()[3].store(9, Ordering::Relaxed);
        assert_eq!(moved.words()[3].load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_heap_words_alias_backing_allocation() {
        let storage = WordStorage::allocate(StorageKind::Heap, 16).unwrap();
        storage.words()[0].store(1, Ordering::Relaxed);
        let first = storage.as_ptr();
        // Rebuilding the slice must not move or re-derive the allocation.
        assert_eq!(storage.words().as_ptr(), first);
        assert_eq!(storage.words()[0].load(Ordering::Relaxed), 1);
        let WordStorage::Heap(words) = &storage else {
            panic!("expected heap storage");
        };
        assert_eq!(words.as_ptr(), first);
    }

    #[test]
    fn test_oversized_mapping_fails() {
        let err = WordStorage::allocate(StorageKind::Mapped, usize::MAX).unwrap_err();
        assert!(matches!(err, MarkMapError::StorageAllocation { .. }));
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_access_panics() {
        let storage = WordStorage::allocate(StorageKind::Heap, 4).unwrap();
        let _ = storage.words()[4].load(Ordering::Relaxed);
    }
}
