//! Parallel task and work-unit dispatch.
//!
//! A [`ParallelTask`] is one bounded unit of collector work run by a fixed
//! number of worker threads. Workers enumerate the same sequence of work
//! units in the same order and ask [`WorkerContext::handle_next_work_unit`]
//! whether each one is theirs. Every unit is handled by exactly one worker.
//!
//! Two claim policies are provided:
//!
//! - [`ClaimPolicy::Dynamic`]: a worker draws a ticket from the shared
//!   counter, skips units until it reaches that ticket, handles it, then draws
//!   again. Faster workers draw more tickets.
//! - [`ClaimPolicy::RoundRobin`]: unit `i` belongs to worker `i % N`. No
//!   shared traffic, no balancing.

use std::num::NonZeroUsize;

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::sync::{AtomicUsize, Ordering};

/// How work units are assigned to workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Tickets drawn from a shared counter.
    #[default]
    Dynamic,
    /// Static modulo assignment.
    RoundRobin,
}

/// Reusable rendezvous for all workers of a task.
#[derive(Debug, Default)]
struct SyncPoint {
    state: Mutex<SyncState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct SyncState {
    arrived: usize,
    generation: u64,
}

impl SyncPoint {
    /// Block until `parties` threads have arrived. The last arrival runs
    /// `on_release` while the others are still parked and gets `true` back.
    fn wait(&self, parties: usize, on_release: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == parties {
            on_release();
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return true;
        }
        while state.generation == generation {
            self.released.wait(&mut state);
        }
        false
    }
}

/// A bounded unit of collector work shared by a fixed set of workers.
#[derive(Debug)]
pub struct ParallelTask {
    thread_count: usize,
    policy: ClaimPolicy,
    /// Next work-unit ticket. Only used by [`ClaimPolicy::Dynamic`].
    next_unit: CachePadded<AtomicUsize>,
    sync: SyncPoint,
}

impl ParallelTask {
    /// Create a task for `thread_count` workers (at least one) using dynamic
    /// claiming.
    #[must_use]
    pub fn new(thread_count: usize) -> Self {
        Self::with_policy(thread_count, ClaimPolicy::default())
    }

    /// Create a task with an explicit claim policy.
    #[must_use]
    pub fn with_policy(thread_count: usize, policy: ClaimPolicy) -> Self {
        Self {
            thread_count: thread_count.max(1),
            policy,
            next_unit: CachePadded::new(AtomicUsize::new(0)),
            sync: SyncPoint::default(),
        }
    }

    /// Number of workers.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Claim policy in use.
    #[must_use]
    pub const fn policy(&self) -> ClaimPolicy {
        self.policy
    }

    /// Tickets drawn so far in the current phase.
    #[must_use]
    pub fn tickets_drawn(&self) -> usize {
        self.next_unit.load(Ordering::Relaxed)
    }

    /// Reset the ticket counter. Requires that no worker is active.
    pub fn reset(&mut self) {
        self.next_unit.store(0, Ordering::Relaxed);
    }

    fn draw_ticket(&self) -> usize {
        self.next_unit.fetch_add(1, Ordering::Relaxed)
    }

    /// Context for worker `worker_id`. Use this to drive workers on threads
    /// the caller manages; [`run`](Self::run) does it for you.
    ///
    /// # Panics
    ///
    /// Panics if `worker_id >= thread_count()`.
    #[must_use]
    pub fn worker(&self, worker_id: usize) -> WorkerContext<'_> {
        assert!(
            worker_id < self.thread_count,
            "worker {worker_id} out of range for {} threads",
            self.thread_count
        );
        WorkerContext {
            task: self,
            worker_id,
            unit_index: 0,
            unit_to_handle: None,
            units_handled: 0,
        }
    }

    /// Run `f` once on every worker and return the results in worker order.
    ///
    /// A single-thread task runs inline on the calling thread. Returning from
    /// `run` means every worker has finished. A panic in any worker is
    /// propagated.
    pub fn run<R, F>(&mut self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&mut WorkerContext<'_>) -> R + Sync,
    {
        self.reset();
        let task = &*self;

        if task.thread_count == 1 {
            return vec![f(&mut task.worker(0))];
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..task.thread_count)
                .map(|id| {
                    let f = &f;
                    scope.spawn(move || f(&mut task.worker(id)))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}

/// Per-worker view of a [`ParallelTask`].
#[derive(Debug)]
pub struct WorkerContext<'t> {
    task: &'t ParallelTask,
    worker_id: usize,
    /// Index of the next unit this worker will look at.
    unit_index: usize,
    /// Ticket currently held, if any.
    unit_to_handle: Option<usize>,
    units_handled: usize,
}

impl WorkerContext<'_> {
    /// This worker's id, `0..thread_count`.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Number of workers in the task.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.task.thread_count
    }

    /// Units looked at in the current phase.
    #[must_use]
    pub const fn units_seen(&self) -> usize {
        self.unit_index
    }

    /// Units this worker has owned in the current phase.
    #[must_use]
    pub const fn units_handled(&self) -> usize {
        self.units_handled
    }

    /// Advance to the next work unit and report whether this worker owns it.
    ///
    /// Every worker must call this exactly once per unit, in the same unit
    /// order, for the ownership guarantee to hold.
    pub fn handle_next_work_unit(&mut self) -> bool {
        let index = self.unit_index;
        self.unit_index += 1;

        let owned = match self.task.policy {
            ClaimPolicy::RoundRobin => index % self.task.thread_count == self.worker_id,
            ClaimPolicy::Dynamic => {
                let ticket = match self.unit_to_handle {
                    Some(ticket) => ticket,
                    None => {
                        let ticket = self.task.draw_ticket();
                        self.unit_to_handle = Some(ticket);
                        ticket
                    }
                };
                // Tickets are drawn only after the previous one is consumed,
                // so the counter is already past every unit seen so far.
                debug_assert!(ticket >= index);
                if ticket == index {
                    self.unit_to_handle = None;
                    true
                } else {
                    false
                }
            }
        };

        if owned {
            self.units_handled += 1;
        }
        owned
    }

    /// Wait for every worker of the task to arrive here.
    ///
    /// Starts a new phase: the ticket counter and this worker's unit cursor
    /// are reset, so the next phase can enumerate units from zero. Exactly
    /// one worker gets `true` back.
    pub fn synchronize(&mut self) -> bool {
        let task = self.task;
        let leader = task.sync.wait(task.thread_count, || {
            task.next_unit.store(0, Ordering::Relaxed);
        });
        self.unit_index = 0;
        self.unit_to_handle = None;
        self.units_handled = 0;
        leader
    }
}

/// Number of CPUs available for collector work.
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
