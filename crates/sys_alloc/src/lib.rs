//! Zero-filled anonymous mappings.
//!
//! Collector side tables (mark maps, card tables) are sized once for the
//! maximum heap and never resized. This crate hands out one contiguous,
//! page-rounded, zero-filled block per request and releases it on drop. It
//! does not commit or decommit sub-ranges.

use std::io;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::page_size;

/// Rounds `len` up to a whole number of pages.
///
/// Returns `None` if the rounded length overflows `usize`.
#[must_use]
pub fn round_to_page(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|n| n & !(page - 1))
}

/// An owned anonymous mapping.
///
/// The memory is readable, writable and zero-filled when handed out. It is
/// unmapped when this handle is dropped.
pub struct Mmap {
    inner: os::MmapInner,
}

impl Mmap {
    /// Returns a pointer to the start of the mapping.
    ///
    /// The pointer is page aligned and valid for `len()` bytes for as long as
    /// `self` is alive.
    #[must_use]
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Returns the length of the mapping in bytes (a multiple of the page size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the mapping has no bytes. Never true for a live mapping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl std::fmt::Debug for Mmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mmap")
            .field("ptr", &self.ptr())
            .field("len", &self.len())
            .finish()
    }
}

// SAFETY: the mapping is plain memory owned by this handle; synchronizing
// access to its contents is the caller's business.
unsafe impl Send for Mmap {}
unsafe impl Sync for Mmap {}

/// Configuration for creating an anonymous mapping.
#[derive(Debug, Clone, Default)]
pub struct MmapOptions {
    len: usize,
    populate: bool,
    no_reserve: bool,
}

impl MmapOptions {
    /// Creates options with length 0. A length must be set before mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            populate: false,
            no_reserve: false,
        }
    }

    /// Sets the requested length in bytes. It is rounded up to whole pages.
    #[must_use]
    pub const fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Pre-fault the page tables (`MAP_POPULATE` on Linux).
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Skip swap reservation (`MAP_NORESERVE` where supported).
    ///
    /// Useful for bitmaps sized for a maximum heap that is mostly never
    /// touched.
    #[must_use]
    pub const fn no_reserve(mut self, no_reserve: bool) -> Self {
        self.no_reserve = no_reserve;
        self
    }

    /// Creates the mapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero or overflowing length, or the OS
    /// error if the mapping could not be created.
    pub fn map_anon(&self) -> io::Result<Mmap> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }
        let len = round_to_page(self.len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "length overflows page rounding")
        })?;

        // SAFETY: no address hint is given, so the OS picks a fresh range and
        // nothing else can alias it.
        let inner = unsafe { os::MmapInner::map_anon(len, self.populate, self.no_reserve)? };

        Ok(Mmap { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        let ps = page_size();
        assert!(ps > 0);
        assert_eq!(ps & (ps - 1), 0, "Page size should be power of 2");
    }

    #[test]
    fn test_round_to_page() {
        let ps = page_size();
        assert_eq!(round_to_page(1), Some(ps));
        assert_eq!(round_to_page(ps), Some(ps));
        assert_eq!(round_to_page(ps + 1), Some(2 * ps));
        assert_eq!(round_to_page(usize::MAX), None);
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = MmapOptions::new().map_anon().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mapping_is_zeroed_and_page_rounded() {
        let mmap = MmapOptions::new()
            .len(100)
            .no_reserve(true)
            .map_anon()
            .expect("failed to map");

        assert_eq!(mmap.len(), page_size());
        assert_eq!(mmap.ptr() as usize % page_size(), 0);

        // SAFETY: the mapping is live and `len()` bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(mmap.ptr(), mmap.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mapping_is_writable() {
        let mmap = MmapOptions::new()
            .len(page_size() * 2)
            .populate(true)
            .map_anon()
            .expect("failed to map");

        unsafe {
            std::ptr::write_volatile(mmap.ptr().add(mmap.len() - 1), 42);
            assert_eq!(std::ptr::read_volatile(mmap.ptr().add(mmap.len() - 1)), 42);
        }
    }
}
