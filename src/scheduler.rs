//! Fan-out/fan-in of broad phase work over a fixed set of threads.

use std::ops::Range;

/// Runs a batch of jobs on worker threads plus the calling thread
/// and blocks until all of them are done.
///
/// Each job gets exclusive access to one element of `parts`.
/// Parts `0..parts.len() - 1` go to workers and the last part
/// is always run by the caller, so a caller with zero workers
/// simply runs everything itself.
pub trait JobScheduler {
    /// Number of threads available in addition to the caller.
    fn worker_count(&self) -> usize;

    fn run<C, F>(&self, parts: &mut [C], job: F)
    where
        C: Send,
        F: Fn(usize, &mut C) + Sync;
}

/// Runs every job on the calling thread, in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialScheduler;

impl JobScheduler for SerialScheduler {
    fn worker_count(&self) -> usize {
        0
    }

    fn run<C, F>(&self, parts: &mut [C], job: F)
    where
        C: Send,
        F: Fn(usize, &mut C) + Sync,
    {
        for (idx, part) in parts.iter_mut().enumerate() {
            job(idx, part);
        }
    }
}

/// Runs jobs on a dedicated rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug)]
pub struct RayonScheduler {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl RayonScheduler {
    /// Create a pool with the given number of worker threads.
    pub fn new(worker_threads: usize) -> crate::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .thread_name(|idx| format!("collision-worker-{idx}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Create a pool with [`worker_threads`][crate::CollisionConfig::worker_threads] threads.
    pub fn from_config(config: &crate::CollisionConfig) -> crate::Result<Self> {
        Self::new(config.worker_threads)
    }
}

#[cfg(feature = "parallel")]
impl JobScheduler for RayonScheduler {
    fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn run<C, F>(&self, parts: &mut [C], job: F)
    where
        C: Send,
        F: Fn(usize, &mut C) + Sync,
    {
        let Some((main_part, worker_parts)) = parts.split_last_mut() else {
            return;
        };
        let main_idx = worker_parts.len();
        let job = &job;
        // the scope only returns once every spawned job has finished
        self.pool.in_place_scope(|scope| {
            for (idx, part) in worker_parts.iter_mut().enumerate() {
                scope.spawn(move |_| job(idx, part));
            }
            job(main_idx, main_part);
        });
    }
}

/// Split `0..len` into `workers + 1` contiguous ranges.
/// The last range belongs to the calling thread and is `main_share` times
/// the size of the others, rounding leftovers into it.
pub fn slice_ranges(len: usize, workers: usize, main_share: f32) -> Vec<Range<usize>> {
    let total_weight = workers as f32 + main_share;
    let per_worker = ((len as f32 / total_weight) as usize).min(len / (workers + 1).max(1));
    let mut ranges = Vec::with_capacity(workers + 1);
    let mut start = 0;
    for _ in 0..workers {
        ranges.push(start..start + per_worker);
        start += per_worker;
    }
    ranges.push(start..len);
    ranges
}
