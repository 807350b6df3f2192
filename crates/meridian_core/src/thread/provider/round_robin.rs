//! Flat least-loaded assignment, one object at a time.

use super::ThreadProvider;
use crate::error::SchedulerResult;
use crate::registry::ObjectRegistry;
use crate::thread::{BatchSetupHandler, WorkerPool};

/// Assigns every object on its own to the least-loaded worker.
///
/// With equal costs the final loads differ by at most one object's cost.
#[derive(Debug)]
pub struct RoundRobinProvider {
    pool: WorkerPool,
}

impl RoundRobinProvider {
    /// Creates a provider for `threads` workers.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkerPool::new(threads),
        }
    }
}

impl ThreadProvider for RoundRobinProvider {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    fn assign(&mut self, registry: &ObjectRegistry) -> SchedulerResult<()> {
        for object in registry.iter() {
            let mut unit = BatchSetupHandler::new();
            unit.add(object);
            unit.push_task(&self.pool);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util;
    use super::*;
    use crate::registry::{ObjectKind, Placement};

    #[test]
    fn test_equal_costs_balance_within_one_object() {
        let mut registry = ObjectRegistry::new();
        for _ in 0..11 {
            test_util::register(&mut registry, Placement::loose(ObjectKind::Agent), 5);
        }

        let mut provider = RoundRobinProvider::new(3);
        provider.start(&test_util::env()).unwrap();
        provider.pool().reset_costs();
        provider.assign(&registry).unwrap();

        let costs: Vec<u64> = provider.pool().workers().iter().map(|w| w.cost()).collect();
        let max = costs.iter().max().copied().unwrap();
        let min = costs.iter().min().copied().unwrap();
        assert!(max - min <= 5, "unbalanced: {costs:?}");
        assert_eq!(costs.iter().sum::<u64>(), 55);
    }
}
