//! Mark map tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! spans and events for clear passes.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::metrics::{ClearReport, WorkerClearStats};

    /// Identifier correlating every event of one clear pass.
    ///
    /// Starts at 1 and increases monotonically per pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearId(pub u64);

    static NEXT_CLEAR_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next clear pass ID.
    pub fn next_clear_id() -> ClearId {
        ClearId(NEXT_CLEAR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Span for a whole parallel clear pass, entered on the calling thread.
    pub fn trace_clear_pass(clear_id: ClearId, threads: usize) -> span::EnteredSpan {
        span!(
            Level::DEBUG,
            "mark_map_clear",
            clear_id = clear_id.0,
            threads = threads
        )
        .entered()
    }

    /// Span for one worker's share of a clear pass.
    pub fn trace_worker(clear_id: ClearId, worker_id: usize) -> span::EnteredSpan {
        span!(
            Level::TRACE,
            "mark_map_clear_worker",
            clear_id = clear_id.0,
            worker_id = worker_id
        )
        .entered()
    }

    /// Log a worker's results.
    pub fn log_worker_done(stats: &WorkerClearStats) {
        tracing::trace!(
            worker_id = stats.worker_id,
            units_seen = stats.units_seen,
            units_processed = stats.units_processed,
            words_cleared = stats.words_cleared,
            "worker_clear_done"
        );
    }

    /// Log the end of a pass.
    pub fn log_clear_done(report: &ClearReport) {
        tracing::debug!(
            units = report.units_total(),
            unit_size = report.unit_size(),
            words_cleared = report.words_cleared(),
            duration_us = u64::try_from(report.duration().as_micros()).unwrap_or(u64::MAX),
            "clear_done"
        );
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearId(pub u64);

    /// Stub function when tracing is disabled.
    pub const fn next_clear_id() -> ClearId {
        ClearId(0)
    }
}

pub use internal::ClearId;
