//! Per-call task pools, work partitioning, and thread-local scratch memory.
//!
//! Every parallel operator builds a [`TaskPool`] sized by its `parallelism`
//! argument, submits a batch of fallible tasks, waits for all of them, and
//! surfaces the first error in task order. No pool outlives the call.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::colgroup::BITMAP_BLOCK_SZ;
use crate::error::{Error, Result};

/// Bounded worker pool for one operator call.
pub struct TaskPool {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl TaskPool {
    /// Creates a pool with `threads` workers, at most one per available core.
    /// One thread runs tasks inline.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailed` if the OS refuses to spawn worker threads.
    pub fn new(threads: usize) -> Result<Self> {
        let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        if threads > available {
            warn!(requested = threads, available, "clamping parallelism to available cores");
        }
        let threads = threads.clamp(1, available);
        let pool = if threads > 1 {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("cla-worker-{i}"))
                    .build()
                    .map_err(|e| Error::TaskFailed(format!("thread pool creation failed: {e}")))?,
            )
        } else {
            None
        };
        Ok(Self { threads, pool })
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Runs all tasks to completion and returns their results in submission order.
    ///
    /// Tasks may borrow disjoint mutable state from the caller. A panicking task
    /// is reported as `TaskFailed`.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest-indexed failing task, after every task has finished.
    pub fn run<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>>
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send,
    {
        let results: Vec<Result<T>> = match &self.pool {
            Some(pool) if tasks.len() > 1 => {
                pool.install(|| tasks.into_par_iter().map(run_guarded).collect())
            }
            _ => tasks.into_iter().map(run_guarded).collect(),
        };
        results.into_iter().collect()
    }
}

fn run_guarded<T, F: FnOnce() -> Result<T>>(task: F) -> Result<T> {
    catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string());
        Err(Error::TaskFailed(message))
    })
}

/// Splits `0..rows` into at most `tasks` ranges aligned to the bitmap block size.
///
/// No encoded offset block straddles two ranges.
#[must_use]
pub fn row_partitions(rows: usize, tasks: usize) -> Vec<Range<usize>> {
    if rows == 0 {
        return Vec::new();
    }
    let per_task = rows.div_ceil(tasks.max(1));
    let block_len = per_task.div_ceil(BITMAP_BLOCK_SZ) * BITMAP_BLOCK_SZ;
    (0..rows)
        .step_by(block_len)
        .map(|start| start..(start + block_len).min(rows))
        .collect()
}

/// Distributes `items` round-robin over at most `tasks` buckets.
///
/// Static assignment: bucket `i` gets items `i, i + k, i + 2k, ...`.
#[must_use]
pub fn round_robin<T: Clone>(items: &[T], tasks: usize) -> Vec<Vec<T>> {
    let k = tasks.max(1).min(items.len().max(1));
    let mut buckets: Vec<Vec<T>> = (0..k).map(|_| Vec::new()).collect();
    for (i, item) in items.iter().enumerate() {
        buckets[i % k].push(item.clone());
    }
    buckets.retain(|b| !b.is_empty());
    buckets
}

thread_local! {
    static SCRATCH: RefCell<Vec<f64>> = const { RefCell::new(Vec::new()) };
}

/// Scope guard for the calling thread's scratch buffer.
///
/// Reserves capacity on creation and releases the memory on drop, on every
/// exit path including errors and unwinding.
#[derive(Debug)]
pub struct ScratchGuard {
    _not_send: PhantomData<*const ()>,
}

impl ScratchGuard {
    /// Reserves `capacity` doubles of scratch on the current thread.
    #[must_use]
    pub fn acquire(capacity: usize) -> Self {
        SCRATCH.with(|s| {
            let mut buf = s.borrow_mut();
            buf.clear();
            buf.reserve(capacity);
        });
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        SCRATCH.with(|s| {
            let mut buf = s.borrow_mut();
            buf.clear();
            buf.shrink_to_fit();
        });
    }
}

/// Runs `f` with a zeroed scratch slice of length `len` from the current thread.
///
/// Must not be nested.
pub fn with_scratch<R>(len: usize, f: impl FnOnce(&mut [f64]) -> R) -> R {
    SCRATCH.with(|s| {
        let mut buf = s.borrow_mut();
        buf.clear();
        buf.resize(len, 0.0);
        f(&mut buf[..len])
    })
}
