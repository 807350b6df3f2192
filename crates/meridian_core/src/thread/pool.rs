//! Fixed pool of worker threads owned by a thread provider.

use std::fmt;
use std::sync::Arc;

use super::batch_thread::{BatchThread, Worker, WorkerId};
use crate::error::{ErrorSink, SchedulerResult};
use crate::monitoring::WaitMonitor;
use crate::sync::CountDownLatch;

/// Everything a worker thread needs from the driver.
#[derive(Clone)]
pub struct WorkerEnv {
    /// Accumulates cross-thread wait time.
    pub wait_monitor: Arc<WaitMonitor>,
    /// Receives panics caught inside object ticks.
    pub error_sink: Arc<dyn ErrorSink>,
    /// Objects ticked between in-batch drains. `0` disables them.
    pub drain_interval: usize,
    /// Thread name prefix; the worker id is appended.
    pub thread_prefix: String,
}

impl fmt::Debug for WorkerEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEnv")
            .field("drain_interval", &self.drain_interval)
            .field("thread_prefix", &self.thread_prefix)
            .finish_non_exhaustive()
    }
}

/// Worker threads plus the balancing helpers the providers share.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    threads: Vec<BatchThread>,
}

impl WorkerPool {
    /// Describes a pool of `size` workers. Nothing is spawned until
    /// [`WorkerPool::start`].
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            threads: Vec::with_capacity(size),
        }
    }

    /// Spawns the worker threads. Calling it on a running pool is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SchedulerError::ThreadSpawn`] if a thread cannot be
    /// spawned; already spawned threads are stopped again.
    pub fn start(&mut self, env: &WorkerEnv) -> SchedulerResult<()> {
        if !self.threads.is_empty() {
            return Ok(());
        }
        for index in 0..self.size {
            let name = format!("{}-{}", env.thread_prefix, index);
            match BatchThread::spawn(name, env.clone()) {
                Ok(thread) => self.threads.push(thread),
                Err(error) => {
                    self.shutdown();
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Configured number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Running worker threads.
    #[must_use]
    pub fn threads(&self) -> &[BatchThread] {
        &self.threads
    }

    /// Shared state of every running worker.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.threads.iter().map(|thread| Arc::clone(thread.worker())).collect()
    }

    /// Looks up a running worker by id.
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<&Arc<Worker>> {
        self.threads
            .iter()
            .map(BatchThread::worker)
            .find(|worker| worker.id() == id)
    }

    /// Returns `true` if no thread is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Zeroes every worker's cost counter.
    pub fn reset_costs(&self) {
        for thread in &self.threads {
            thread.worker().reset_cost();
        }
    }

    /// Worker with the lowest accumulated cost. Ties go to the first.
    #[must_use]
    pub fn least_loaded(&self) -> Option<&Arc<Worker>> {
        self.threads
            .iter()
            .map(BatchThread::worker)
            .min_by_key(|worker| worker.cost())
    }

    /// Lowest accumulated cost in the pool.
    #[must_use]
    pub fn min_cost(&self) -> Option<u64> {
        self.threads.iter().map(BatchThread::cost).min()
    }

    /// Starts a cycle on every worker.
    ///
    /// All tick windows open before any worker wakes, so a request against
    /// a worker that has not begun yet still queues. The returned latch
    /// opens when every worker finished its batch.
    pub fn notify_threads(&self, time: u64) -> Arc<CountDownLatch> {
        let latch = Arc::new(CountDownLatch::new(self.threads.len()));
        for thread in &self.threads {
            thread.worker().open_window();
        }
        for thread in &self.threads {
            thread.worker().signal(Arc::clone(&latch), time);
        }
        latch
    }

    /// Stops and joins every worker.
    pub fn shutdown(&mut self) {
        for thread in &mut self.threads {
            thread.shutdown();
        }
        self.threads.clear();
    }
}
