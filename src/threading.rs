//! Thread pool contract for NCHWc dispatches
//!
//! A dispatch splits its work across `max_threads()` indexed callbacks and
//! joins before returning; workers never spawn further work and never
//! communicate. The engine only requires the fan-out primitive below, so
//! any executor (rayon, a custom pool, a bare loop) can drive it.

/// Fan-out collaborator used by the convolution and pooling entry points.
///
/// `execute` must invoke `routine(i)` exactly once for every
/// `i in [0, count)`, possibly in parallel, and return only after all
/// invocations have completed.
pub trait ThreadPool: Sync {
    /// Number of workers a dispatch should be partitioned across.
    fn max_threads(&self) -> usize;

    /// Run `count` indexed callbacks and join.
    fn execute(&self, count: usize, routine: &(dyn Fn(usize) + Sync));
}

/// Pool that runs every callback on the calling thread.
///
/// Also the way tests pin a dispatch to a single worker when checking
/// thread-count independence.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialPool;

impl ThreadPool for SequentialPool {
    fn max_threads(&self) -> usize {
        1
    }

    fn execute(&self, count: usize, routine: &(dyn Fn(usize) + Sync)) {
        for index in 0..count {
            routine(index);
        }
    }
}

/// Pool backed by the rayon global thread pool.
#[cfg(feature = "rayon")]
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonPool;

#[cfg(feature = "rayon")]
impl ThreadPool for RayonPool {
    fn max_threads(&self) -> usize {
        rayon::current_num_threads()
    }

    fn execute(&self, count: usize, routine: &(dyn Fn(usize) + Sync)) {
        use rayon::prelude::*;

        (0..count).into_par_iter().for_each(|index| routine(index));
    }
}

/// The default pool for this build: rayon when the `rayon` feature is
/// enabled, otherwise the sequential fallback.
#[cfg(feature = "rayon")]
pub fn default_thread_pool() -> &'static dyn ThreadPool {
    static POOL: RayonPool = RayonPool;
    &POOL
}

/// The default pool for this build: rayon when the `rayon` feature is
/// enabled, otherwise the sequential fallback.
#[cfg(not(feature = "rayon"))]
pub fn default_thread_pool() -> &'static dyn ThreadPool {
    static POOL: SequentialPool = SequentialPool;
    &POOL
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn covers_all_indices(pool: &dyn ThreadPool, count: usize) {
        let visited: Vec<AtomicUsize> = (0..count).map(|_| AtomicUsize::new(0)).collect();
        pool.execute(count, &|index| {
            visited[index].fetch_add(1, Ordering::Relaxed);
        });
        for slot in &visited {
            assert_eq!(slot.load(Ordering::Relaxed), 1);
        }
    }

    #[test]
    fn test_sequential_pool() {
        assert_eq!(SequentialPool.max_threads(), 1);
        covers_all_indices(&SequentialPool, 17);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_rayon_pool() {
        assert!(RayonPool.max_threads() >= 1);
        covers_all_indices(&RayonPool, 64);
    }

    #[test]
    fn test_default_pool() {
        assert!(default_thread_pool().max_threads() >= 1);
        covers_all_indices(default_thread_pool(), 8);
    }
}
