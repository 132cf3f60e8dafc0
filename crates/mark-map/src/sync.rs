//! Atomics shared by the bitmap and the task.
//!
//! Built with `--cfg loom`, these are loom's model-checked atomics so the loom
//! tests exercise the real marking and claim paths.

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(not(loom))]
pub use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
