//! Hex dump of the bitmap for debugging.

use std::io::{self, Write};

use crate::geometry::BITS_PER_WORD;
use crate::mark_map::MarkMap;
use crate::sync::Ordering;

/// Words printed per dump line.
pub const WORDS_PER_PAGE: usize = 8;

const HEX_DIGITS: usize = BITS_PER_WORD / 4;

impl MarkMap {
    /// Number of dump pages the storage spans.
    #[must_use]
    pub fn dump_pages(&self) -> usize {
        self.word_count().div_ceil(WORDS_PER_PAGE)
    }

    /// Write the bitmap to `out`.
    ///
    /// The first line describes the storage; each following line is one page
    /// of [`WORDS_PER_PAGE`] words in fixed-width lowercase hex. `pages`
    /// limits the output and is clamped to the storage size; `None` dumps
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns any error from `out`.
    pub fn dump<W: Write + ?Sized>(&self, out: &mut W, pages: Option<usize>) -> io::Result<()> {
        let storage = self.storage();
        let base = storage.as_ptr();
        let top = base.wrapping_add(storage.len());
        writeln!(
            out,
            "mark map base: {base:p}, top: {top:p}, size: {:#x}, words: {}",
            storage.byte_len(),
            storage.len()
        )?;

        let pages = pages.map_or(self.dump_pages(), |p| p.min(self.dump_pages()));
        #[cfg(feature = "tracing")]
        tracing::debug!(pages, "mark_map_dump");

        let words = storage.words();
        for (page, chunk) in words.chunks(WORDS_PER_PAGE).take(pages).enumerate() {
            write!(out, "Page {page}: 0x")?;
            for word in chunk {
                let value = word.load(Ordering::Relaxed);
                write!(out, "{value:0width$x}", width = HEX_DIGITS)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Write every storage byte as `{address}: {byte:02x}`, one per line,
    /// in memory order.
    ///
    /// This is the exhaustive form of [`dump`](Self::dump); output grows with
    /// the whole storage, so keep it for small maps.
    ///
    /// # Errors
    ///
    /// Returns any error from `out`.
    pub fn dump_bytes<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let storage = self.storage();
        let base = storage.as_ptr().cast::<u8>();
        #[cfg(feature = "tracing")]
        tracing::debug!(bytes = storage.byte_len(), "mark_map_dump_bytes");

        let bytes = storage
            .words()
            .iter()
            .flat_map(|word| word.load(Ordering::Relaxed).to_ne_bytes());
        for (offset, byte) in bytes.enumerate() {
            writeln!(out, "{:p}: {byte:02x}", base.wrapping_add(offset))?;
        }
        Ok(())
    }
}
