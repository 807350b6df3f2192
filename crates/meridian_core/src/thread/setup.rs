//! Accumulates one unit of work before it is pushed to a worker.

use std::sync::Arc;

use super::batch_thread::Worker;
use super::pool::WorkerPool;
use crate::lock::Schedulable;
use crate::registry::LiveObject;

/// Objects that must land on the same worker, with their summed cost.
#[derive(Default)]
pub struct BatchSetupHandler {
    elements: Vec<Arc<dyn Schedulable>>,
    estimated_cost: u64,
}

impl BatchSetupHandler {
    /// Creates an empty unit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live object and its cost.
    pub fn add(&mut self, object: &LiveObject) {
        self.elements.push(Arc::clone(&object.target));
        self.estimated_cost += object.cost;
    }

    /// Summed estimated cost.
    #[must_use]
    pub fn estimated_cost(&self) -> u64 {
        self.estimated_cost
    }

    /// Number of objects in the unit.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Pushes the unit to the least-loaded worker of `pool`.
    ///
    /// Returns the chosen worker, `None` if the pool has no thread or the
    /// unit is empty.
    pub fn push_task(self, pool: &WorkerPool) -> Option<Arc<Worker>> {
        if self.is_empty() {
            return None;
        }
        let worker = Arc::clone(pool.least_loaded()?);
        self.push_to(&worker);
        Some(worker)
    }

    /// Pushes the unit to `worker`, updating every affinity record first.
    pub fn push_to(self, worker: &Arc<Worker>) {
        for element in &self.elements {
            element.handler().refresh_thread(worker);
        }
        worker.add_batch(self.elements, self.estimated_cost);
    }
}

impl std::fmt::Debug for BatchSetupHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSetupHandler")
            .field("elements", &self.elements.len())
            .field("estimated_cost", &self.estimated_cost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogErrorSink;
    use crate::lock::Acquirable;
    use crate::monitoring::WaitMonitor;
    use crate::registry::{ObjectKind, Placement};
    use crate::test_support::Inert;
    use crate::thread::WorkerEnv;

    fn live(cost: u64) -> LiveObject {
        LiveObject {
            target: Arc::new(Acquirable::new(Inert)),
            placement: Placement::loose(ObjectKind::Agent),
            cost,
        }
    }

    #[test]
    fn test_push_task_assigns_affinity_and_cost() {
        let mut pool = WorkerPool::new(2);
        pool.start(&WorkerEnv {
            wait_monitor: Arc::new(WaitMonitor::new(false)),
            error_sink: Arc::new(LogErrorSink),
            drain_interval: 0,
            thread_prefix: "setup-test".into(),
        })
        .unwrap();

        let first = live(5);
        let second = live(5);
        let mut unit = BatchSetupHandler::new();
        unit.add(&first);
        unit.add(&second);
        assert_eq!(unit.estimated_cost(), 10);
        assert_eq!(unit.len(), 2);

        let worker = unit.push_task(&pool).unwrap();
        assert_eq!(worker.cost(), 10);
        assert_eq!(worker.batch_len(), 2);
        assert_eq!(first.target.handler().worker_id(), Some(worker.id()));
        assert_eq!(second.target.handler().worker_id(), Some(worker.id()));
    }

    #[test]
    fn test_empty_unit_is_not_pushed() {
        let pool = WorkerPool::new(1);
        assert!(BatchSetupHandler::new().push_task(&pool).is_none());
    }
}
