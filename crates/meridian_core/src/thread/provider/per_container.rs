//! Default strategy: everything in a container goes to one worker.
//!
//! Keeping a container's objects together means most acquisitions inside a
//! tick hit the fast path.

use std::collections::HashMap;
use std::sync::Arc;

use super::ThreadProvider;
use crate::error::SchedulerResult;
use crate::registry::{ContainerId, ObjectRegistry};
use crate::thread::{BatchSetupHandler, Worker, WorkerId, WorkerPool};

/// Assigns each container, with all its regions and agents, as one unit.
/// Objects outside any container are assigned one by one.
///
/// A container sticks to its previous worker while that worker is still
/// among the least loaded.
#[derive(Debug)]
pub struct PerContainerProvider {
    pool: WorkerPool,
    hints: HashMap<ContainerId, Option<WorkerId>>,
}

impl PerContainerProvider {
    /// Creates a provider for `threads` workers.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkerPool::new(threads),
            hints: HashMap::new(),
        }
    }

    /// Worker the container was assigned to last cycle.
    #[must_use]
    pub fn hint(&self, container: ContainerId) -> Option<WorkerId> {
        self.hints.get(&container).copied().flatten()
    }

    /// Containers currently tracked.
    #[must_use]
    pub fn tracked_containers(&self) -> usize {
        self.hints.len()
    }

    fn pick(&self, container: ContainerId) -> Option<Arc<Worker>> {
        let least = self.pool.least_loaded()?;
        let sticky = self
            .hint(container)
            .and_then(|id| self.pool.worker(id))
            .filter(|worker| worker.cost() == least.cost());
        Some(Arc::clone(sticky.unwrap_or(least)))
    }
}

impl ThreadProvider for PerContainerProvider {
    fn name(&self) -> &'static str {
        "per_container"
    }

    fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    fn assign(&mut self, registry: &ObjectRegistry) -> SchedulerResult<()> {
        for (container, objects) in registry.group_by_container() {
            let Some(container) = container else {
                for object in objects {
                    let mut unit = BatchSetupHandler::new();
                    unit.add(object);
                    unit.push_task(&self.pool);
                }
                continue;
            };

            let mut unit = BatchSetupHandler::new();
            for object in objects {
                unit.add(object);
            }
            if let Some(worker) = self.pick(container) {
                unit.push_to(&worker);
                self.hints.insert(container, Some(worker.id()));
            }
        }
        Ok(())
    }

    fn on_container_create(&mut self, container: ContainerId) {
        self.hints.entry(container).or_insert(None);
    }

    fn on_container_remove(&mut self, container: ContainerId) {
        self.hints.remove(&container);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util;
    use super::*;
    use crate::registry::{ObjectKind, Placement, RegionCoord};

    #[test]
    fn test_container_objects_share_a_worker() {
        let mut registry = ObjectRegistry::new();
        let alpha = ContainerId(1);
        let beta = ContainerId(2);
        let origin = RegionCoord::new(0, 0);

        let alpha_root = test_util::register(&mut registry, Placement::container(alpha), 5);
        let alpha_region = test_util::register(&mut registry, Placement::region(alpha, origin), 5);
        let alpha_agent = test_util::register(&mut registry, Placement::agent(alpha, origin), 5);
        let beta_root = test_util::register(&mut registry, Placement::container(beta), 5);

        let mut provider = PerContainerProvider::new(2);
        provider.start(&test_util::env()).unwrap();
        provider.on_container_create(alpha);
        provider.on_container_create(beta);
        provider.pool().reset_costs();
        provider.assign(&registry).unwrap();

        let alpha_worker = alpha_root.handler().worker_id();
        assert!(alpha_worker.is_some());
        assert_eq!(alpha_region.handler().worker_id(), alpha_worker);
        assert_eq!(alpha_agent.handler().worker_id(), alpha_worker);
        assert_ne!(beta_root.handler().worker_id(), alpha_worker);
        assert_eq!(provider.hint(alpha), alpha_worker);
    }

    #[test]
    fn test_loose_objects_spread_out() {
        let mut registry = ObjectRegistry::new();
        let first = test_util::register(&mut registry, Placement::loose(ObjectKind::Agent), 5);
        let second = test_util::register(&mut registry, Placement::loose(ObjectKind::Agent), 5);

        let mut provider = PerContainerProvider::new(2);
        provider.start(&test_util::env()).unwrap();
        provider.pool().reset_costs();
        provider.assign(&registry).unwrap();

        assert_ne!(first.handler().worker_id(), second.handler().worker_id());
    }

    #[test]
    fn test_remove_drops_hint() {
        let mut provider = PerContainerProvider::new(1);
        provider.on_container_create(ContainerId(9));
        assert_eq!(provider.tracked_containers(), 1);
        assert_eq!(provider.hint(ContainerId(9)), None);
        provider.on_container_remove(ContainerId(9));
        assert_eq!(provider.tracked_containers(), 0);
    }
}
