//! Worker-thread configuration and data-parallel loops.
//!
//! Parallel regions in this crate follow one pattern: read-only shared
//! state, each worker writing to a disjoint slice, and a first-error-wins
//! collector that re-raises after the region joins. [`parallel_for`] runs a
//! closure over an index range on a dedicated rayon pool, passing each
//! invocation the index and the id of the worker executing it.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::error::{Error, Result};

// =============================================================================
// ThreadConfig
// =============================================================================

/// A sized worker pool shared by parallel regions.
///
/// `nthread <= 0` selects one worker per available core.
pub struct ThreadConfig {
    nthread: usize,
    pool: rayon::ThreadPool,
}

impl ThreadConfig {
    /// Build a pool with the requested number of workers.
    pub fn new(nthread: i32) -> Result<Self> {
        let nthread = if nthread <= 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            nthread as usize
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nthread)
            .build()
            .map_err(|e| Error::Concurrency(format!("failed to build thread pool: {e}")))?;
        Ok(Self { nthread, pool })
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn nthread(&self) -> usize {
        self.nthread
    }
}

impl std::fmt::Debug for ThreadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadConfig").field("nthread", &self.nthread).finish()
    }
}

// =============================================================================
// ParallelSchedule
// =============================================================================

/// How iterations of a parallel loop are assigned to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelSchedule {
    /// Let the scheduler pick (work-stealing over medium-sized chunks).
    #[default]
    Auto,
    /// Contiguous near-equal ranges, one per worker, or fixed-size chunks
    /// assigned round-robin when a chunk size is given.
    Static(Option<usize>),
    /// Fixed-size chunks claimed by idle workers.
    Dynamic(Option<usize>),
    /// Like dynamic with scheduler-chosen shrinking chunks.
    Guided,
}

/// Split `[begin, end)` into `n` contiguous near-equal ranges.
///
/// The remainder is distributed one row at a time to the leading ranges, so
/// range `i` is owned by worker `i` deterministically.
pub fn split_ranges(begin: usize, end: usize, n: usize) -> Vec<std::ops::Range<usize>> {
    let len = end - begin;
    let portion = len / n;
    let remainder = len % n;
    let mut ranges = Vec::with_capacity(n);
    let mut start = begin;
    for i in 0..n {
        let size = portion + usize::from(i < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    debug_assert_eq!(start, end);
    ranges
}

// =============================================================================
// parallel_for
// =============================================================================

/// Run `body(index, worker_id)` for every index in `[begin, end)`.
///
/// `worker_id` is always in `0..config.nthread()`. With the default static
/// schedule each worker owns one contiguous range, so per-worker
/// accumulation buffers indexed by `worker_id` never overlap. The first
/// error returned by any invocation is captured under a mutex and re-raised
/// here after all workers join; remaining chunks are skipped once an error
/// is recorded.
pub fn parallel_for<F>(
    begin: usize,
    end: usize,
    config: &ThreadConfig,
    schedule: ParallelSchedule,
    body: F,
) -> Result<()>
where
    F: Fn(usize, usize) -> Result<()> + Sync,
{
    if begin >= end {
        return Ok(());
    }

    let first_error: Mutex<Option<Error>> = Mutex::new(None);
    let record = |err: Error| {
        let mut slot = first_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    };
    let poisoned = || first_error.lock().unwrap().is_some();

    let chunks: Vec<std::ops::Range<usize>> = match schedule {
        ParallelSchedule::Static(None) => split_ranges(begin, end, config.nthread),
        ParallelSchedule::Static(Some(chunk)) | ParallelSchedule::Dynamic(Some(chunk)) => {
            let chunk = chunk.max(1);
            (begin..end).step_by(chunk).map(|s| s..(s + chunk).min(end)).collect()
        }
        ParallelSchedule::Auto | ParallelSchedule::Dynamic(None) | ParallelSchedule::Guided => {
            let chunk = ((end - begin) / (config.nthread * 4)).max(1);
            (begin..end).step_by(chunk).map(|s| s..(s + chunk).min(end)).collect()
        }
    };
    let static_ownership = matches!(schedule, ParallelSchedule::Static(None));

    config.pool.install(|| {
        chunks.into_par_iter().enumerate().for_each(|(chunk_id, range)| {
            if poisoned() {
                return;
            }
            // Under the plain static schedule, chunk index == worker id.
            let worker_id = if static_ownership {
                chunk_id
            } else {
                rayon::current_thread_index().unwrap_or(0)
            };
            for i in range {
                if let Err(err) = body(i, worker_id) {
                    record(err);
                    return;
                }
            }
        });
    });

    match first_error.into_inner().unwrap() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
