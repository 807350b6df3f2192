//! Worker threads.
//!
//! ```text
//!   Idle ──signal──▶ Ticking ──▶ Draining ──▶ Idle ──count_down
//!                     │    ▲
//!          acquire    ▼    │ released
//!                    Blocked
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use super::pool::WorkerEnv;
use super::queue::BatchQueue;
use crate::error::{panic_message, SchedulerError, SchedulerResult};
use crate::lock::{AcquisitionContext, Schedulable};
use crate::sync::CountDownLatch;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a worker. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Where a worker is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for the next tick signal.
    Idle = 0,
    /// Running its batch.
    Ticking = 1,
    /// Mid-tick, waiting on another worker's queue.
    Blocked = 2,
    /// Performing the end-of-batch drain.
    Draining = 3,
    /// Thread has exited.
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Ticking,
            2 => Self::Blocked,
            3 => Self::Draining,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    /// Returns `true` between the tick signal and the final drain.
    #[must_use]
    pub const fn in_tick_window(self) -> bool {
        matches!(self, Self::Ticking | Self::Blocked | Self::Draining)
    }
}

/// Work handed to a worker for one cycle.
#[derive(Default)]
struct BatchRunnable {
    batch: Vec<Arc<dyn Schedulable>>,
    latch: Option<Arc<CountDownLatch>>,
    time: u64,
}

/// State shared between a worker thread and everyone else.
pub struct Worker {
    id: WorkerId,
    name: String,
    queue: BatchQueue,
    state: AtomicU8,
    cost: AtomicU64,
    runnable: Mutex<BatchRunnable>,
    start: Condvar,
    stop: AtomicBool,
}

impl Worker {
    fn new(name: String) -> Self {
        Self {
            id: WorkerId::next(),
            name,
            queue: BatchQueue::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            cost: AtomicU64::new(0),
            runnable: Mutex::new(BatchRunnable::default()),
            start: Condvar::new(),
            stop: AtomicBool::new(false),
        }
    }

    /// A worker record with no thread behind it.
    #[cfg(test)]
    pub(crate) fn detached(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name.to_string()))
    }

    /// Worker identity.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn swap_state(&self, state: WorkerState) -> WorkerState {
        WorkerState::from_u8(self.state.swap(state as u8, Ordering::AcqRel))
    }

    /// Estimated cost assigned this cycle.
    #[must_use]
    pub fn cost(&self) -> u64 {
        self.cost.load(Ordering::Relaxed)
    }

    /// Pending-request queue.
    #[must_use]
    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    pub(crate) fn reset_cost(&self) {
        self.cost.store(0, Ordering::Relaxed);
    }

    /// Appends `elements` to this cycle's batch.
    pub(crate) fn add_batch(&self, elements: Vec<Arc<dyn Schedulable>>, cost: u64) {
        self.cost.fetch_add(cost, Ordering::Relaxed);
        self.runnable.lock().batch.extend(elements);
    }

    #[cfg(test)]
    pub(crate) fn batch_len(&self) -> usize {
        self.runnable.lock().batch.len()
    }

    /// Opens the tick window without waking the thread.
    pub(crate) fn open_window(&self) {
        self.set_state(WorkerState::Ticking);
        self.queue.open();
    }

    /// Wakes the thread to run its batch and count down `latch`.
    pub(crate) fn signal(&self, latch: Arc<CountDownLatch>, time: u64) {
        let mut runnable = self.runnable.lock();
        runnable.latch = Some(latch);
        runnable.time = time;
        self.start.notify_one();
    }

    fn request_stop(&self) {
        let _guard = self.runnable.lock();
        self.stop.store(true, Ordering::Release);
        self.start.notify_one();
    }

    /// Blocks until a cycle is signalled. `None` means stop.
    fn next_cycle(&self) -> Option<(Vec<Arc<dyn Schedulable>>, Arc<CountDownLatch>, u64)> {
        let mut runnable = self.runnable.lock();
        loop {
            if let Some(latch) = runnable.latch.take() {
                let batch = std::mem::take(&mut runnable.batch);
                return Some((batch, latch, runnable.time));
            }
            if self.stop.load(Ordering::Acquire) {
                runnable.batch.clear();
                return None;
            }
            self.start.wait(&mut runnable);
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cost", &self.cost())
            .finish_non_exhaustive()
    }
}

/// Owning handle to a worker thread. Dropping it stops and joins.
pub struct BatchThread {
    worker: Arc<Worker>,
    join: Option<JoinHandle<()>>,
}

impl BatchThread {
    /// Spawns a worker thread named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadSpawn`] if the OS refuses the thread.
    pub fn spawn(name: String, env: WorkerEnv) -> SchedulerResult<Self> {
        let worker = Arc::new(Worker::new(name.clone()));
        let thread_worker = Arc::clone(&worker);

        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(&thread_worker, &env))
            .map_err(|source| SchedulerError::ThreadSpawn { name, source })?;

        tracing::debug!(worker = %worker.id(), name = worker.name(), "worker spawned");
        Ok(Self {
            worker,
            join: Some(join),
        })
    }

    /// Shared worker state.
    #[must_use]
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Worker identity.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.worker.id()
    }

    /// Estimated cost assigned this cycle.
    #[must_use]
    pub fn cost(&self) -> u64 {
        self.worker.cost()
    }

    /// Stops the thread at its next idle point and joins it.
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.worker.request_stop();
        if join.join().is_err() {
            tracing::error!(worker = %self.worker.id(), "worker thread panicked outside a tick");
        }
    }
}

impl Drop for BatchThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for BatchThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchThread")
            .field("worker", &self.worker)
            .field("running", &self.join.is_some())
            .finish()
    }
}

fn run(worker: &Arc<Worker>, env: &WorkerEnv) {
    let ctx = AcquisitionContext::for_worker(Arc::clone(worker), Arc::clone(&env.wait_monitor));

    while let Some((batch, latch, time)) = worker.next_cycle() {
        for (index, target) in batch.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| target.tick(time, &ctx)));
            if let Err(payload) = outcome {
                worker.set_state(WorkerState::Ticking);
                env.error_sink.report(&SchedulerError::TickPanicked {
                    worker: worker.id(),
                    handle: target.id(),
                    message: panic_message(payload.as_ref()),
                });
            }

            if env.drain_interval > 0 && (index + 1) % env.drain_interval == 0 {
                worker.queue.drain();
            }
        }
        drop(batch);

        worker.set_state(WorkerState::Draining);
        let released = worker.queue.end_window();
        worker.set_state(WorkerState::Idle);
        tracing::trace!(worker = %worker.id(), released, "batch complete");
        latch.count_down();
    }

    worker.set_state(WorkerState::Stopped);
    worker.queue.close();
    tracing::debug!(worker = %worker.id(), "worker exited");
}
