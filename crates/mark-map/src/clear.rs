//! Parallel clear of the mark map at the start of a collection cycle.
//!
//! Only words backing committed regions are zeroed. Each committed region is
//! walked front to back in work units of `unit_size` heap bytes; every worker
//! enumerates the same units and clears the ones it owns. Owned units map to
//! disjoint word ranges, so the stores need no synchronization beyond the
//! claim itself.
//!
//! Region low addresses are expected to sit on a word boundary (heap
//! alignment is at least one word's coverage in practice). Unit edges inside
//! a region may fall mid-word: both ends of a unit round up to the next word,
//! so a shared word goes to the earlier unit and is cleared exactly once.

use std::time::Instant;

use crate::mark_map::MarkMap;
use crate::metrics::{ClearReport, WorkerClearStats};
use crate::region::{HeapRegion, RegionManager};
use crate::task::{ParallelTask, WorkerContext};

/// Units per worker when more than one worker clears.
///
/// Over-partitioning lets idle workers pick up slack from slow ones.
pub const PARALLEL_MULTIPLIER: usize = 32;

/// Heap bytes per clear work unit.
///
/// `memory_size / (N == 1 ? 1 : N * PARALLEL_MULTIPLIER)`, rounded up to
/// `alignment`, and never smaller than `alignment` so the walk always makes
/// progress.
#[must_use]
pub fn clear_unit_size(memory_size: usize, thread_count: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    let factor = match thread_count {
        0 | 1 => 1,
        n => n.saturating_mul(PARALLEL_MULTIPLIER),
    };
    let unit = (memory_size / factor).div_ceil(alignment) * alignment;
    unit.max(alignment)
}

impl MarkMap {
    /// Clear this worker's share of the bitmap for every committed region.
    ///
    /// Every worker of the task must call this with the same `heap`. Words
    /// backing uncommitted regions are never touched. Drops validity.
    ///
    /// The task must guarantee that no marking starts before every worker has
    /// returned from this call.
    pub fn initialize_mark_map<H>(&self, ctx: &mut WorkerContext<'_>, heap: &H) -> WorkerClearStats
    where
        H: RegionManager + ?Sized,
    {
        let start = Instant::now();
        self.set_valid(false);

        let unit_size =
            clear_unit_size(heap.memory_size(), ctx.thread_count(), heap.heap_alignment());
        let units_seen_before = ctx.units_seen();
        let units_handled_before = ctx.units_handled();
        let mut words_cleared = 0;

        for region in heap.regions().filter(HeapRegion::is_committed) {
            words_cleared += self.clear_region(ctx, region, unit_size);
        }

        let stats = WorkerClearStats {
            worker_id: ctx.worker_id(),
            unit_size,
            units_seen: ctx.units_seen() - units_seen_before,
            units_processed: ctx.units_handled() - units_handled_before,
            words_cleared,
            duration: start.elapsed(),
        };

        #[cfg(feature = "tracing")]
        crate::tracing::internal::log_worker_done(&stats);

        stats
    }

    fn clear_region(&self, ctx: &mut WorkerContext<'_>, region: HeapRegion, unit_size: usize) -> usize {
        let geometry = self.geometry();
        debug_assert!(region.low_address() >= self.base_delta());
        debug_assert!(region.high_address() - self.base_delta() <= self.coverage());
        debug_assert_eq!(
            (region.low_address() - self.base_delta()) & (geometry.word_coverage() - 1),
            0,
            "region {:#x} does not start on a word boundary",
            region.low_address()
        );

        let mut address = region.low_address();
        let mut remaining = region.size();
        let mut words_cleared = 0;

        while remaining != 0 {
            let current = unit_size.min(remaining);
            debug_assert!(current > 0);

            if ctx.handle_next_work_unit() {
                // Both bounds come from offsets, not from a size, so adjacent
                // units agree on the word between them.
                let low = address - self.base_delta();
                let first = geometry.offset_to_word_ceil(low);
                let end = geometry.offset_to_word_ceil(low + current);
                if end > first {
                    self.bulk_set_words(first, end - 1, 0);
                    words_cleared += end - first;
                }
            }

            address += current;
            remaining -= current;
        }
        words_cleared
    }

    /// Clear the words backing every committed region using all workers of
    /// `task`, and wait for them to finish.
    pub fn clear_committed<H>(&self, heap: &H, task: &mut ParallelTask) -> ClearReport
    where
        H: RegionManager + Sync + ?Sized,
    {
        let clear_id = crate::tracing::internal::next_clear_id();
        #[cfg(feature = "tracing")]
        let _span = crate::tracing::internal::trace_clear_pass(clear_id, task.thread_count());

        let start = Instant::now();
        let workers = task.run(|ctx| {
            #[cfg(feature = "tracing")]
            let _worker = crate::tracing::internal::trace_worker(clear_id, ctx.worker_id());
            self.initialize_mark_map(ctx, heap)
        });
        let report = ClearReport::new(workers, start.elapsed());

        #[cfg(feature = "tracing")]
        crate::tracing::internal::log_clear_done(&report);
        #[cfg(not(feature = "tracing"))]
        let _ = clear_id;

        report
    }

    /// Single-threaded [`clear_committed`](Self::clear_committed).
    pub fn clear<H>(&self, heap: &H) -> ClearReport
    where
        H: RegionManager + Sync + ?Sized,
    {
        self.clear_committed(heap, &mut ParallelTask::new(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarkMapConfig, StorageKind};
    use crate::geometry::BITS_PER_WORD;
    use crate::region::HeapLayout;

    const BASE: usize = 0x4000_0000;

    fn filled_map(heap: usize) -> MarkMap {
        let map = MarkMap::new(
            &MarkMapConfig::new(heap)
                .with_heap_base(BASE)
                .with_storage(StorageKind::Heap),
        )
        .unwrap();
        map.bulk_set_words(0, map.word_count() - 1, usize::MAX);
        map
    }

    #[test]
    fn test_unit_size_single_thread_is_whole_heap() {
        assert_eq!(clear_unit_size(1 << 20, 1, 4096), 1 << 20);
    }

    #[test]
    fn test_unit_size_over_partitions() {
        assert_eq!(clear_unit_size(1 << 20, 8, 4096), (1 << 20) / 256);
        // 1 MiB / 96 rounds up to the next 4 KiB.
        assert_eq!(clear_unit_size(1 << 20, 3, 4096), 12 * 1024);
    }

    #[test]
    fn test_unit_size_never_zero() {
        assert_eq!(clear_unit_size(0, 8, 4096), 4096);
        assert_eq!(clear_unit_size(100, 8, 4096), 4096);
    }

    #[test]
    fn test_single_region_exactly_one_unit() {
        let map = filled_map(1 << 20);
        let layout = HeapLayout::new(4096).with_region(HeapRegion::committed(BASE, 64 * 1024));

        let report = map.clear(&layout);

        let words = 64 * 1024 / (8 * BITS_PER_WORD);
        assert_eq!(report.units_total(), 1);
        assert_eq!(report.words_cleared(), words);
        assert!(map.words().take(words).all(|w| w == 0));
        assert!(map.words().skip(words).all(|w| w == usize::MAX));
    }

    #[test]
    fn test_uncommitted_words_untouched() {
        let map = filled_map(1 << 20);
        let layout = HeapLayout::new(4096)
            .with_region(HeapRegion::committed(BASE, 0x1_0000))
            .with_region(HeapRegion::uncommitted(BASE + 0x1_0000, 0x2_0000))
            .with_region(HeapRegion::committed(BASE + 0x3_0000, 0x1_0000));

        map.clear_committed(&layout, &mut ParallelTask::new(4));

        let c = map.geometry().word_coverage();
        for (i, w) in map.words().enumerate() {
            let addr = BASE + i * c;
            let committed = addr < BASE + 0x1_0000
                || (BASE + 0x3_0000..BASE + 0x4_0000).contains(&addr);
            assert_eq!(w == 0, committed, "word {i}");
        }
    }

    #[test]
    fn test_clear_drops_validity() {
        let map = filled_map(1 << 16);
        map.set_valid(true);
        map.clear(&HeapLayout::new(4096).with_region(HeapRegion::committed(BASE, 1 << 16)));
        assert!(!map.is_valid());
    }

    #[test]
    fn test_word_shared_by_unit_edge_goes_to_earlier_unit() {
        let map = filled_map(1 << 20);
        let c = map.geometry().word_coverage();
        // Two workers, so units are memory / 64 = 1.5 words each.
        let layout = HeapLayout::new(8).with_region(HeapRegion::committed(BASE, 96 * c));
        assert_eq!(clear_unit_size(96 * c, 2, 8), c + c / 2);

        // Round robin: unit 0 is worker 0's, unit 1 is worker 1's. Only run
        // worker 0.
        let task = ParallelTask::with_policy(2, crate::task::ClaimPolicy::RoundRobin);
        let stats = map.initialize_mark_map(&mut task.worker(0), &layout);

        // Unit 0 covers [0, 1.5c): words 0 and 1, including the word it
        // shares with unit 1.
        assert_eq!(map.word(0), 0);
        assert_eq!(map.word(1), 0);
        // Unit 1 starts at word 2 and belongs to the idle worker.
        assert_eq!(map.word(2), usize::MAX);
        // Unit 2 covers [3c, 4.5c): words 3 and 4.
        assert_eq!(map.word(3), 0);
        assert_eq!(map.word(4), 0);
        assert_eq!(map.word(5), usize::MAX);
        assert_eq!(stats.words_cleared, 64);
    }

    #[test]
    fn test_unaligned_unit_edges_cover_region_once() {
        // Alignment below one word's coverage puts unit edges mid-word.
        let map = filled_map(1 << 16);
        let layout = HeapLayout::new(8).with_region(HeapRegion::committed(BASE, 1 << 16));

        let report = map.clear_committed(&layout, &mut ParallelTask::new(3));

        assert_eq!(report.words_cleared(), map.word_count());
        assert_eq!(report.units_processed(), report.units_total());
        assert!(map.words().all(|w| w == 0));
    }
}
