//! Fixed-size worker pool

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{EngineError, Result};

/// Dedicated rayon pool, kept apart from the global pool so search workers
/// never compete with one-shot parallel work.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(EngineError::WorkerPool("at least one worker is required".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("turbomul-worker-{}", i))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job(worker_id)` once on every worker and wait for all of them.
    pub fn broadcast<F>(&self, job: F)
    where
        F: Fn(usize) + Sync,
    {
        let job = &job;
        self.pool.scope(|s| {
            for id in 0..self.workers {
                s.spawn(move |_| job(id));
            }
        });
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("workers", &self.workers).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_broadcast_runs_each_worker_once() {
        let pool = WorkerPool::new(4).unwrap();
        let seen = Mutex::new(Vec::new());
        pool.broadcast(|id| seen.lock().push(id));
        let mut seen = seen.into_inner();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(EngineError::WorkerPool(_))));
    }
}
