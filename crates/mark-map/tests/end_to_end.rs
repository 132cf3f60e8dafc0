//! Full collection-cycle tests: create, clear, mark, validate, sweep.

use mark_map::{
    HeapLayout, HeapRegion, MarkMap, MarkMapConfig, MarkMapError, ParallelTask, StorageKind,
    BITS_PER_WORD,
};

const BASE: usize = 0x3000_0000;

#[cfg(target_pointer_width = "64")]
#[test]
fn test_one_mib_heap_sixteen_byte_granule() {
    let map = MarkMap::new(
        &MarkMapConfig::new(1 << 20)
            .with_heap_base(BASE)
            .with_granule_size(16),
    )
    .unwrap();
    assert_eq!(map.word_count(), 1024);
    assert_eq!(map.storage_kind(), StorageKind::Mapped);

    // Dirty the storage as a previous cycle would have.
    map.bulk_set_words(0, 1023, 0xdead_beef);
    map.set_valid(true);

    let layout = HeapLayout::new(4096).with_region(HeapRegion::committed(BASE, 1 << 20));
    let report = map.clear(&layout);

    assert_eq!(report.words_cleared(), 1024);
    assert!(map.words().all(|w| w == 0));
    assert!(!map.is_valid());

    // Only the mark orchestrator flips validity back on.
    map.mark(BASE + 0x100);
    assert!(!map.is_valid());
    map.set_valid(true);
    assert!(map.is_valid());
}

#[test]
fn test_cycle_mark_then_sweep_recovers_objects() {
    let heap = 4 << 20;
    let map = MarkMap::new(&MarkMapConfig::new(heap).with_heap_base(BASE)).unwrap();
    let layout = HeapLayout::new(64 * 1024).with_region(HeapRegion::committed(BASE, heap));

    // Objects: (address, size in bytes).
    let objects: Vec<(usize, usize)> = (0..200)
        .map(|i| (BASE + i * 4096 + (i % 7) * 16, 24 + (i % 5) * 8))
        .collect();

    let mut task = ParallelTask::new(4);
    map.clear_committed(&layout, &mut task);

    task.run(|ctx| {
        for (i, &(addr, _)) in objects.iter().enumerate() {
            if i % ctx.thread_count() == ctx.worker_id() && i % 3 != 0 {
                map.mark(addr);
            }
        }
    });
    map.set_valid(true);

    let live: Vec<usize> = map.marked_addresses().collect();
    let expected: Vec<usize> = objects
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(_, &(addr, _))| addr)
        .collect();
    assert_eq!(live, expected);

    for (i, &(addr, size)) in objects.iter().enumerate() {
        assert_eq!(map.any_marked_in_range(addr, addr + size), i % 3 != 0);
    }
}

#[test]
fn test_sweep_reads_word_addresses() {
    let map = MarkMap::new(
        &MarkMapConfig::new(1 << 20)
            .with_heap_base(BASE)
            .with_storage(StorageKind::Heap),
    )
    .unwrap();
    let coverage = map.geometry().word_coverage();
    map.mark(BASE + 3 * coverage + 5 * 8);

    let (word, bits) = map
        .words()
        .enumerate()
        .find(|&(_, bits)| bits != 0)
        .unwrap();
    assert_eq!(word, 3);
    let first = map.word_address(word) + bits.trailing_zeros() as usize * 8;
    assert_eq!(first, BASE + 3 * coverage + 40);
}

#[test]
fn test_card_misconfiguration_is_fatal() {
    let config = MarkMapConfig::new(1 << 20).with_card_size(4 * BITS_PER_WORD);
    match MarkMap::new(&config) {
        Err(MarkMapError::CardSizeMismatch {
            card_size,
            word_coverage,
        }) => {
            assert_eq!(card_size, 4 * BITS_PER_WORD);
            assert_eq!(word_coverage, 8 * BITS_PER_WORD);
        }
        other => panic!("expected card size mismatch, got {other:?}"),
    }
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_storage_failure_is_reported() {
    let config = MarkMapConfig::new(usize::MAX)
        .with_granule_size(1)
        .with_storage(StorageKind::Heap);
    assert!(matches!(
        MarkMap::new(&config),
        Err(MarkMapError::StorageAllocation { .. })
    ));
}
