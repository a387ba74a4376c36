//! Bounded pool of in-flight tasks, drained oldest first.

use std::collections::VecDeque;
use std::future::Future;

use ciocheck_core::{CiocheckError, PoolConfig, Result};
use tokio::task::JoinHandle;

/// Sizing for [`WorkerPool`].
///
/// # Examples
///
/// ```
/// use ciocheck_tools::pool::PoolLimits;
///
/// let limits = PoolLimits { batch_size: 3, in_flight_factor: 3, workers: 4 };
/// assert_eq!(limits.high_water(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Files handed to one task.
    pub batch_size: usize,
    /// Tasks allowed in flight per worker before draining starts.
    pub in_flight_factor: usize,
    /// Number of processors to plan for; draining stops at this many.
    pub workers: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl PoolLimits {
    /// Limits from configuration, detecting the processor count when unset.
    pub fn from_config(config: &PoolConfig) -> Self {
        let workers = config.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        Self {
            batch_size: config.batch_size.max(1),
            in_flight_factor: config.in_flight_factor.max(1),
            workers: workers.max(1),
        }
    }

    /// In-flight count above which a submit drains the pool.
    pub fn high_water(&self) -> usize {
        self.workers * self.in_flight_factor
    }
}

/// Spawns tasks on the tokio runtime and keeps at most
/// [`PoolLimits::high_water`] of them running.
///
/// When a submit pushes the in-flight count past the high-water mark, the
/// oldest tasks are awaited until only [`PoolLimits::workers`] remain.
/// Results are collected in the order tasks are awaited (oldest first, as
/// they are drained), not the order they finish. Callers that need a stable
/// order sort the collected results; the multi-formatter sorts by path.
/// Dropping the pool aborts whatever is still running.
#[derive(Debug)]
pub struct WorkerPool<T> {
    limits: PoolLimits,
    in_flight: VecDeque<JoinHandle<T>>,
    finished: Vec<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            limits,
            in_flight: VecDeque::new(),
            finished: Vec::new(),
        }
    }

    /// Number of tasks spawned and not yet awaited.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawn `task`, draining the oldest tasks first if the pool is over
    /// its high-water mark.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Tool`] if a drained task panicked.
    pub async fn submit<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.in_flight.push_back(tokio::spawn(task));

        if self.in_flight.len() > self.limits.high_water() {
            tracing::debug!(in_flight = self.in_flight.len(), "draining worker pool");
            while self.in_flight.len() > self.limits.workers {
                if let Some(result) = self.await_one().await? {
                    self.finished.push(result);
                }
            }
        }
        Ok(())
    }

    /// Await the oldest in-flight task. `None` when the pool is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Tool`] if the task panicked or was aborted.
    pub async fn await_one(&mut self) -> Result<Option<T>> {
        let Some(handle) = self.in_flight.pop_front() else {
            return Ok(None);
        };
        handle
            .await
            .map(Some)
            .map_err(|e| CiocheckError::tool("worker-pool", format!("worker task failed: {e}")))
    }

    /// Await every remaining task, returning all results not yet handed out,
    /// drained ones first.
    pub async fn await_all(&mut self) -> Result<Vec<T>> {
        let mut results = std::mem::take(&mut self.finished);
        while let Some(result) = self.await_one().await? {
            results.push(result);
        }
        Ok(results)
    }

    /// Abort every in-flight task.
    pub fn cancel(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        for handle in &self.in_flight {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn limits(workers: usize, factor: usize) -> PoolLimits {
        PoolLimits {
            batch_size: 1,
            in_flight_factor: factor,
            workers,
        }
    }

    #[tokio::test]
    async fn submit_drains_down_to_worker_count() {
        let mut pool = WorkerPool::new(limits(1, 2));
        pool.submit(async { 1 }).await.unwrap();
        pool.submit(async { 2 }).await.unwrap();
        assert_eq!(pool.in_flight(), 2);

        pool.submit(async { 3 }).await.unwrap();
        assert_eq!(pool.in_flight(), 1);

        assert_eq!(pool.await_all().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn results_follow_drain_order_not_finish_order() {
        let mut pool = WorkerPool::new(limits(2, 1));
        for i in 0..6u64 {
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(30 - i * 5)).await;
                i
            })
            .await
            .unwrap();
        }
        assert_eq!(pool.await_all().await.unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_tasks() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut pool = WorkerPool::new(limits(4, 3));
        let flag = Arc::clone(&finished);
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

        pool.cancel();
        assert_eq!(pool.in_flight(), 0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert!(pool.await_one().await.unwrap().is_none());
    }

    #[test]
    fn limits_never_drop_to_zero() {
        let config = PoolConfig {
            batch_size: 0,
            in_flight_factor: 0,
            workers: Some(0),
        };
        let limits = PoolLimits::from_config(&config);
        assert_eq!(limits.batch_size, 1);
        assert_eq!(limits.workers, 1);
        assert_eq!(limits.high_water(), 1);
    }
}
