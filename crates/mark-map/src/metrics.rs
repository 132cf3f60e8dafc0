//! Clear pass statistics.

use std::time::Duration;

/// What one worker did during a clear pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerClearStats {
    /// Worker id within the task.
    pub worker_id: usize,
    /// Heap bytes per work unit for this pass.
    pub unit_size: usize,
    /// Work units enumerated (the same for every worker of a pass).
    pub units_seen: usize,
    /// Work units this worker owned and cleared.
    pub units_processed: usize,
    /// Bitmap words this worker zeroed.
    pub words_cleared: usize,
    /// Time spent in the clear routine.
    pub duration: Duration,
}

/// Aggregate of a parallel clear pass.
#[derive(Debug, Clone, Default)]
pub struct ClearReport {
    workers: Vec<WorkerClearStats>,
    duration: Duration,
}

impl ClearReport {
    /// Build a report from per-worker stats in worker order.
    #[must_use]
    pub const fn new(workers: Vec<WorkerClearStats>, duration: Duration) -> Self {
        Self { workers, duration }
    }

    /// Per-worker statistics, in worker order.
    #[must_use]
    pub fn workers(&self) -> &[WorkerClearStats] {
        &self.workers
    }

    /// Number of work units the heap was split into.
    #[must_use]
    pub fn units_total(&self) -> usize {
        self.workers.iter().map(|w| w.units_seen).max().unwrap_or(0)
    }

    /// Work units processed across all workers. Equals
    /// [`units_total`](Self::units_total) when every unit was claimed once.
    #[must_use]
    pub fn units_processed(&self) -> usize {
        self.workers.iter().map(|w| w.units_processed).sum()
    }

    /// Words zeroed across all workers.
    #[must_use]
    pub fn words_cleared(&self) -> usize {
        self.workers.iter().map(|w| w.words_cleared).sum()
    }

    /// Work-unit size used for the pass.
    #[must_use]
    pub fn unit_size(&self) -> usize {
        self.workers.first().map_or(0, |w| w.unit_size)
    }

    /// Wall time of the whole pass.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}
