//! # Update Driver
//!
//! Fixed-rate cycle on a dedicated thread:
//!
//! ```text
//! next-tick tasks → start callbacks → assign (provider lock) → signal workers
//!   → await latch → end callbacks → stats → monitors (take wait time)
//! ```
//!
//! A failure anywhere in a cycle is reported to the error sink; the next
//! cycle still starts on schedule.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::SchedulerConfig;
use crate::contention::{ContentionResolver, WorkerDirectory};
use crate::error::{panic_message, ErrorSink, LogErrorSink, SchedulerError, SchedulerResult};
use crate::lock::{AcquisitionContext, HandleId, Schedulable};
use crate::monitoring::{TickMonitor, WaitMonitor};
use crate::registry::{ContainerId, ObjectRegistry, Placement, RegionCoord};
use crate::thread::provider::{self, ThreadProvider};
use crate::thread::{Worker, WorkerEnv};
use crate::tick::{TickLoop, TickStats};

/// Identifies a registered callback or monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Outcome of one cycle.
#[derive(Clone, Copy, Debug)]
pub struct TickReport {
    /// Cycle number, starting at 1.
    pub tick: u64,
    /// Wall-clock time handed to every object, in milliseconds.
    pub time: u64,
    /// From cycle start until every worker finished.
    pub duration: Duration,
    /// Objects registered when the cycle was assigned.
    pub objects: usize,
    /// Wait time handed to monitors, `None` when no monitor is registered.
    pub acquisition_time: Option<Duration>,
}

type NextTickTask = Box<dyn FnOnce() + Send>;

/// Callbacks run as a snapshot so they may (un)register from inside.
struct CallbackList<F: ?Sized> {
    entries: RwLock<Vec<(CallbackId, Arc<F>)>>,
}

impl<F: ?Sized> CallbackList<F> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: CallbackId, callback: Arc<F>) {
        self.entries.write().push((id, callback));
    }

    fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.read().iter().map(|(_, callback)| Arc::clone(callback)).collect()
    }
}

struct UpdateShared {
    config: SchedulerConfig,
    env: WorkerEnv,
    /// Serializes whole cycles.
    cycle: Mutex<()>,
    /// Held for assignment, provider swaps and lifecycle signals.
    provider: Mutex<Box<dyn ThreadProvider>>,
    registry: RwLock<ObjectRegistry>,
    directory: WorkerDirectory,
    tick_start: CallbackList<dyn Fn(u64) + Send + Sync>,
    tick_end: CallbackList<dyn Fn(f64) + Send + Sync>,
    monitors: CallbackList<dyn Fn(&TickMonitor) + Send + Sync>,
    next_tick: Mutex<Vec<NextTickTask>>,
    next_callback_id: AtomicU64,
    tick_count: AtomicU64,
    stats: Mutex<TickStats>,
}

impl UpdateShared {
    fn tick_once(&self) -> SchedulerResult<TickReport> {
        let _cycle = self.cycle.lock();
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        let result = match catch_unwind(AssertUnwindSafe(|| self.run_cycle(tick))) {
            Ok(result) => result,
            Err(payload) => Err(SchedulerError::CyclePanicked {
                tick,
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Err(error) = &result {
            self.env.error_sink.report(error);
        }
        result
    }

    fn run_cycle(&self, tick: u64) -> SchedulerResult<TickReport> {
        let started = Instant::now();
        let time = now_millis();

        let tasks = std::mem::take(&mut *self.next_tick.lock());
        for task in tasks {
            task();
        }
        for callback in self.tick_start.snapshot() {
            callback(time);
        }

        let (latch, objects) = {
            let mut provider = self.provider.lock();
            let registry = self.registry.read();
            (provider.update(&registry, time)?, registry.len())
        };
        latch.wait();

        let duration = started.elapsed();
        let tick_ms = duration.as_secs_f64() * 1000.0;
        for callback in self.tick_end.snapshot() {
            callback(tick_ms);
        }

        let budget = self.config.tick_period();
        if self.stats.lock().record(duration, budget) {
            tracing::warn!(tick, elapsed_ms = tick_ms, budget_ms = self.config.tick_ms, "tick overran its budget");
        }

        let monitors = self.monitors.snapshot();
        let acquisition_time = if monitors.is_empty() {
            None
        } else {
            let waited = self.env.wait_monitor.take();
            let report = TickMonitor::new(duration, waited);
            for monitor in monitors {
                monitor(&report);
            }
            Some(waited)
        };

        tracing::trace!(tick, objects, elapsed_ms = tick_ms, "cycle complete");
        Ok(TickReport {
            tick,
            time,
            duration,
            objects,
            acquisition_time,
        })
    }

    fn next_id(&self) -> CallbackId {
        CallbackId(self.next_callback_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn drive(shared: &UpdateShared, stop_rx: &Receiver<()>) {
    let mut tick_loop = TickLoop::new(shared.config.tick_period());
    loop {
        match stop_rx.recv_deadline(tick_loop.next_deadline()) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let skipped = tick_loop.skipped();
        let _start = tick_loop.begin_tick();
        if tick_loop.skipped() > skipped {
            tracing::warn!(
                dropped = tick_loop.skipped() - skipped,
                "driver fell behind; rescheduling from now"
            );
        }
        // Failures were already reported to the sink.
        let _ = shared.tick_once();
    }
    tracing::debug!(ticks = tick_loop.tick_count(), "update driver stopped");
}

struct DriverThread {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Owns the worker pool, the live objects and the tick cadence.
///
/// Everything is usable from any thread. Dropping the manager stops the
/// driver, the contention resolver and every worker.
pub struct UpdateManager {
    shared: Arc<UpdateShared>,
    driver: Mutex<Option<DriverThread>>,
    resolver: Mutex<Option<ContentionResolver>>,
}

impl UpdateManager {
    /// Builds a manager with the provider selected in `config` and the
    /// logging error sink. Workers start immediately; ticking starts with
    /// [`UpdateManager::start`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Config`] for invalid values and
    /// [`SchedulerError::ThreadSpawn`] if a thread cannot be spawned.
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        let provider = provider::from_config(&config);
        Self::with_parts(config, provider, Arc::new(LogErrorSink))
    }

    /// Builds a manager around a custom provider.
    ///
    /// # Errors
    ///
    /// As [`UpdateManager::new`].
    pub fn with_provider(config: SchedulerConfig, provider: Box<dyn ThreadProvider>) -> SchedulerResult<Self> {
        Self::with_parts(config, provider, Arc::new(LogErrorSink))
    }

    /// Builds a manager around a custom provider and error sink.
    ///
    /// # Errors
    ///
    /// As [`UpdateManager::new`].
    pub fn with_parts(
        config: SchedulerConfig,
        mut provider: Box<dyn ThreadProvider>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        let env = WorkerEnv {
            wait_monitor: Arc::new(WaitMonitor::new(config.wait_monitoring)),
            error_sink,
            drain_interval: config.drain_interval,
            thread_prefix: config.thread_name_prefix.clone(),
        };
        provider.start(&env)?;

        let directory: WorkerDirectory = Arc::new(RwLock::new(provider.pool().workers()));
        let resolver = ContentionResolver::start(Arc::clone(&directory), config.resolver_period())?;

        tracing::info!(
            strategy = provider.name(),
            threads = provider.pool().threads().len(),
            tick_ms = config.tick_ms,
            "scheduler ready"
        );

        let stats = TickStats::new(config.tick_period());
        Ok(Self {
            shared: Arc::new(UpdateShared {
                config,
                env,
                cycle: Mutex::new(()),
                provider: Mutex::new(provider),
                registry: RwLock::new(ObjectRegistry::new()),
                directory,
                tick_start: CallbackList::new(),
                tick_end: CallbackList::new(),
                monitors: CallbackList::new(),
                next_tick: Mutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(1),
                tick_count: AtomicU64::new(0),
                stats: Mutex::new(stats),
            }),
            driver: Mutex::new(None),
            resolver: Mutex::new(Some(resolver)),
        })
    }

    /// Starts the fixed-rate driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if the driver is running,
    /// [`SchedulerError::ThreadSpawn`] if its thread cannot be spawned.
    pub fn start(&self) -> SchedulerResult<()> {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let name = "meridian-update".to_string();
        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || drive(&shared, &stop_rx))
            .map_err(|source| SchedulerError::ThreadSpawn { name, source })?;

        tracing::info!(tick_ms = self.shared.config.tick_ms, "update driver started");
        *driver = Some(DriverThread { stop_tx, join });
        Ok(())
    }

    /// Stops the driver at its next cycle boundary and joins it.
    pub fn stop(&self) {
        let Some(driver) = self.driver.lock().take() else {
            return;
        };
        let _ = driver.stop_tx.send(());
        if driver.join.join().is_err() {
            tracing::error!("update driver panicked");
        }
    }

    /// Stops the driver, the contention resolver and every worker.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(mut resolver) = self.resolver.lock().take() {
            resolver.stop();
        }
        let mut provider = self.shared.provider.lock();
        provider.shutdown();
        self.shared.directory.write().clear();
    }

    /// Returns `true` while the driver thread runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Runs one cycle on the calling thread.
    ///
    /// Failures are reported to the error sink and returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkers`] if objects exist but no worker
    /// does, [`SchedulerError::CyclePanicked`] if the cycle panicked.
    pub fn tick_once(&self) -> SchedulerResult<TickReport> {
        self.shared.tick_once()
    }

    /// Replaces the assignment strategy.
    ///
    /// The new provider's workers are started first. The swap happens
    /// between two assignments; the old provider is shut down exactly once,
    /// after it has finished any in-flight cycle. Both pools stay visible
    /// to the contention resolver until the old workers have exited.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadSpawn`] if the new workers cannot be
    /// started; the old provider stays in place.
    pub fn set_thread_provider(&self, mut provider: Box<dyn ThreadProvider>) -> SchedulerResult<()> {
        provider.start(&self.shared.env)?;
        let to = provider.name();

        let mut old = {
            let mut current = self.shared.provider.lock();
            let old = std::mem::replace(&mut *current, provider);
            let mut handover = current.pool().workers();
            handover.extend(old.pool().workers());
            *self.shared.directory.write() = handover;
            old
        };

        tracing::info!(from = old.name(), to, "thread provider swapped");
        old.shutdown();

        let current = self.shared.provider.lock();
        *self.shared.directory.write() = current.pool().workers();
        Ok(())
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.shared.provider.lock().name()
    }

    /// Registers an object with the configured cost for its kind.
    pub fn register(&self, target: Arc<dyn Schedulable>, placement: Placement) -> HandleId {
        let cost = self.shared.config.costs.cost_of(placement.kind);
        self.register_with_cost(target, placement, cost)
    }

    /// Registers an object with an explicit cost.
    pub fn register_with_cost(&self, target: Arc<dyn Schedulable>, placement: Placement, cost: u64) -> HandleId {
        self.shared.registry.write().insert(target, placement, cost)
    }

    /// Unregisters an object. Returns `false` if it was not registered.
    pub fn unregister(&self, id: HandleId) -> bool {
        self.shared.registry.write().remove(id).is_some()
    }

    /// Number of registered objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Notifies the provider that a container was created.
    pub fn signal_container_created(&self, container: ContainerId) {
        self.shared.provider.lock().on_container_create(container);
    }

    /// Notifies the provider that a container was removed.
    pub fn signal_container_removed(&self, container: ContainerId) {
        self.shared.provider.lock().on_container_remove(container);
    }

    /// Notifies the provider that a region was loaded.
    pub fn signal_region_loaded(&self, container: ContainerId, region: RegionCoord) {
        self.shared.provider.lock().on_region_load(container, region);
    }

    /// Notifies the provider that a region was unloaded.
    pub fn signal_region_unloaded(&self, container: ContainerId, region: RegionCoord) {
        self.shared.provider.lock().on_region_unload(container, region);
    }

    /// Adds a callback run at the start of every cycle with the wall-clock
    /// time in milliseconds.
    pub fn add_tick_start_callback(&self, callback: impl Fn(u64) + Send + Sync + 'static) -> CallbackId {
        let id = self.shared.next_id();
        self.shared.tick_start.add(id, Arc::new(callback));
        id
    }

    /// Removes a tick-start callback.
    pub fn remove_tick_start_callback(&self, id: CallbackId) -> bool {
        self.shared.tick_start.remove(id)
    }

    /// Adds a callback run after every cycle with its duration in
    /// milliseconds.
    pub fn add_tick_end_callback(&self, callback: impl Fn(f64) + Send + Sync + 'static) -> CallbackId {
        let id = self.shared.next_id();
        self.shared.tick_end.add(id, Arc::new(callback));
        id
    }

    /// Removes a tick-end callback.
    pub fn remove_tick_end_callback(&self, id: CallbackId) -> bool {
        self.shared.tick_end.remove(id)
    }

    /// Adds a monitoring consumer. While at least one is registered, the
    /// accumulated wait time is reported and reset every cycle.
    pub fn add_tick_monitor(&self, monitor: impl Fn(&TickMonitor) + Send + Sync + 'static) -> CallbackId {
        let id = self.shared.next_id();
        self.shared.monitors.add(id, Arc::new(monitor));
        id
    }

    /// Removes a monitoring consumer.
    pub fn remove_tick_monitor(&self, id: CallbackId) -> bool {
        self.shared.monitors.remove(id)
    }

    /// Runs `task` once, at the start of the next cycle.
    pub fn run_next_tick(&self, task: impl FnOnce() + Send + 'static) {
        self.shared.next_tick.lock().push(Box::new(task));
    }

    /// Acquisition context for the calling thread, recording its waits.
    #[must_use]
    pub fn acquisition_context(&self) -> AcquisitionContext {
        AcquisitionContext::with_monitor(Arc::clone(&self.shared.env.wait_monitor))
    }

    /// Wait time accumulated since the last monitoring report.
    #[must_use]
    pub fn pending_wait_time(&self) -> Duration {
        self.shared.env.wait_monitor.current()
    }

    /// Cycle timing statistics.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        *self.shared.stats.lock()
    }

    /// Cycles started so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count.load(Ordering::Relaxed)
    }

    /// Workers of the active provider.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.shared.directory.read().clone()
    }

    /// Number of running workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.directory.read().len()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

impl Drop for UpdateManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateManager")
            .field("provider", &self.provider_name())
            .field("workers", &self.worker_count())
            .field("objects", &self.object_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
