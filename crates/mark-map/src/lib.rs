//! A liveness bitmap ("mark map") for tracing garbage collectors.
//!
//! `mark-map` records one bit per fixed-size heap granule. The mark phase sets
//! bits as objects are found reachable, sweep reads them back to rebuild
//! object boundaries, and incremental scanners ask whether a card holds any
//! live data in O(1).
//!
//! # Components
//!
//! - [`Geometry`]: shift-and-mask mapping between heap addresses and bits
//! - [`MarkMap`]: storage sized once for the maximum heap, with atomic
//!   marking, exclusive bulk stores, range queries and card queries
//! - [`ParallelTask`]: worker threads with a shared work-unit claim counter
//!   and a barrier
//! - [`MarkMap::clear_committed`]: zeroes the words backing committed regions
//!   across every worker of a task
//!
//! # Quick Start
//!
//! ```
//! use mark_map::{HeapLayout, HeapRegion, MarkMap, MarkMapConfig, ParallelTask};
//!
//! let base = 0x4000_0000;
//! let map = MarkMap::new(&MarkMapConfig::new(1 << 20).with_heap_base(base)).unwrap();
//! let heap = HeapLayout::new(4096).with_region(HeapRegion::committed(base, 1 << 20));
//!
//! // Start of a cycle: clear everything that backs committed memory.
//! let report = map.clear_committed(&heap, &mut ParallelTask::new(4));
//! assert_eq!(report.units_processed(), report.units_total());
//!
//! // Mark phase.
//! map.mark(base + 128);
//! map.set_valid(true);
//!
//! // Sweep.
//! assert_eq!(map.marked_addresses().collect::<Vec<_>>(), vec![base + 128]);
//! ```
//!
//! # Thread Safety
//!
//! `MarkMap` is `Sync`. Concurrent markers must use the atomic paths
//! ([`MarkMap::atomic_set_bits`], [`MarkMap::mark`], [`MarkMap::mark_range`]).
//! [`MarkMap::bulk_set_words`] requires exclusive access to its range; the
//! clear protocol guarantees this by construction.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod clear;
mod config;
mod dump;
mod error;
pub mod geometry;
mod mark_map;
mod metrics;
pub mod region;
mod storage;
mod sync;
pub mod task;
mod tracing;

pub use clear::{clear_unit_size, PARALLEL_MULTIPLIER};
pub use config::{MarkMapConfig, StorageKind, DEFAULT_GRANULE_SIZE, DEFAULT_MAX_HEAP_SIZE};
pub use dump::WORDS_PER_PAGE;
pub use error::{MarkMapError, Result};
pub use geometry::{BitIndex, BlockEnd, Geometry, BITS_PER_WORD};
pub use mark_map::MarkMap;
pub use metrics::{ClearReport, WorkerClearStats};
pub use region::{HeapLayout, HeapRegion, RegionManager};
pub use task::{available_parallelism, ClaimPolicy, ParallelTask, WorkerContext};
pub use tracing::ClearId;
