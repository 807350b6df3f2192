//! # Thread Providers
//!
//! A provider owns a [`WorkerPool`] and decides, every cycle, which worker
//! ticks which object. All strategies share the same contract:
//!
//! 1. Reset every worker's cost counter.
//! 2. Walk the live objects, form units of work, and push each unit to the
//!    least-loaded worker, updating affinity records on the way.
//! 3. Open every tick window, then wake every worker.
//!
//! Lifecycle signals (`on_*`) arrive under the same lock as `update`, so a
//! provider never sees them mid-assignment.

mod per_container;
mod per_region;
mod round_robin;
mod sharded;

pub use per_container::PerContainerProvider;
pub use per_region::PerRegionProvider;
pub use round_robin::RoundRobinProvider;
pub use sharded::ShardedProvider;

use std::sync::Arc;

use super::pool::{WorkerEnv, WorkerPool};
use crate::config::{SchedulerConfig, StrategyConfig};
use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::{ContainerId, ObjectRegistry, RegionCoord};
use crate::sync::CountDownLatch;

/// Assignment strategy plus the worker pool it feeds.
pub trait ThreadProvider: Send {
    /// Short strategy name, for logs.
    fn name(&self) -> &'static str;

    /// Worker pool.
    fn pool(&self) -> &WorkerPool;

    /// Worker pool, mutably.
    fn pool_mut(&mut self) -> &mut WorkerPool;

    /// Builds this cycle's batches. Costs are already reset.
    ///
    /// # Errors
    ///
    /// Strategy-specific; the built-in ones never fail.
    fn assign(&mut self, registry: &ObjectRegistry) -> SchedulerResult<()>;

    /// Spawns the worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadSpawn`] if a thread cannot be spawned.
    fn start(&mut self, env: &WorkerEnv) -> SchedulerResult<()> {
        self.pool_mut().start(env)
    }

    /// Assigns every live object and starts the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoWorkers`] when objects exist but the pool
    /// has no thread, or whatever [`ThreadProvider::assign`] returns.
    fn update(&mut self, registry: &ObjectRegistry, time: u64) -> SchedulerResult<Arc<CountDownLatch>> {
        if self.pool().is_empty() && !registry.is_empty() {
            return Err(SchedulerError::NoWorkers {
                objects: registry.len(),
            });
        }
        self.pool().reset_costs();
        self.assign(registry)?;
        Ok(self.pool().notify_threads(time))
    }

    /// Stops and joins every worker.
    fn shutdown(&mut self) {
        self.pool_mut().shutdown();
    }

    /// A container entered the simulation.
    fn on_container_create(&mut self, _container: ContainerId) {}

    /// A container left the simulation.
    fn on_container_remove(&mut self, _container: ContainerId) {}

    /// A region of `container` was loaded.
    fn on_region_load(&mut self, _container: ContainerId, _region: RegionCoord) {}

    /// A region of `container` was unloaded.
    fn on_region_unload(&mut self, _container: ContainerId, _region: RegionCoord) {}
}

/// Builds the provider selected in `config`. Threads are not started.
#[must_use]
pub fn from_config(config: &SchedulerConfig) -> Box<dyn ThreadProvider> {
    match config.strategy {
        StrategyConfig::PerContainer => Box::new(PerContainerProvider::new(config.threads)),
        StrategyConfig::PerRegion => Box::new(PerRegionProvider::new(config.threads)),
        StrategyConfig::RoundRobin => Box::new(RoundRobinProvider::new(config.threads)),
        StrategyConfig::Sharded { shard_size } => Box::new(ShardedProvider::new(config.threads, shard_size)),
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use crate::error::LogErrorSink;
    use crate::lock::Acquirable;
    use crate::monitoring::WaitMonitor;
    use crate::registry::{ObjectRegistry, Placement};
    use crate::test_support::Inert;
    use crate::thread::WorkerEnv;

    pub(crate) fn env() -> WorkerEnv {
        WorkerEnv {
            wait_monitor: Arc::new(WaitMonitor::new(false)),
            error_sink: Arc::new(LogErrorSink),
            drain_interval: 0,
            thread_prefix: "provider-test".into(),
        }
    }

    pub(crate) fn register(registry: &mut ObjectRegistry, placement: Placement, cost: u64) -> Arc<Acquirable<Inert>> {
        let handle = Arc::new(Acquirable::new(Inert));
        registry.insert(handle.clone(), placement, cost);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ObjectKind, Placement};
    use std::time::Duration;

    #[test]
    fn test_from_config_selects_strategy() {
        let mut config = SchedulerConfig::default();
        assert_eq!(from_config(&config).name(), "per_container");

        config.strategy = StrategyConfig::Sharded { shard_size: 4 };
        assert_eq!(from_config(&config).name(), "sharded");

        config.strategy = StrategyConfig::RoundRobin;
        let provider = from_config(&config);
        assert_eq!(provider.name(), "round_robin");
        assert_eq!(provider.pool().size(), config.threads);
    }

    #[test]
    fn test_update_without_threads_fails() {
        let mut registry = ObjectRegistry::new();
        test_util::register(&mut registry, Placement::loose(ObjectKind::Agent), 5);

        let mut provider = RoundRobinProvider::new(2);
        let result = provider.update(&registry, 0);
        assert!(matches!(result, Err(SchedulerError::NoWorkers { objects: 1 })));
    }

    #[test]
    fn test_update_runs_a_cycle() {
        let mut registry = ObjectRegistry::new();
        let handle = test_util::register(&mut registry, Placement::loose(ObjectKind::Agent), 5);

        let mut provider = RoundRobinProvider::new(2);
        provider.start(&test_util::env()).unwrap();
        let latch = provider.update(&registry, 0).unwrap();
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert!(handle.handler().worker_id().is_some());
        provider.shutdown();
        assert!(provider.pool().is_empty());
    }
}
