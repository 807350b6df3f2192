//! Fixed-size shards of consecutive objects.

use super::ThreadProvider;
use crate::error::SchedulerResult;
use crate::registry::ObjectRegistry;
use crate::thread::{BatchSetupHandler, WorkerPool};

/// Cuts the registration order into shards of `shard_size` objects and
/// pushes each shard to the least-loaded worker.
#[derive(Debug)]
pub struct ShardedProvider {
    pool: WorkerPool,
    shard_size: usize,
}

impl ShardedProvider {
    /// Creates a provider. A shard size of 0 is treated as 1.
    #[must_use]
    pub fn new(threads: usize, shard_size: usize) -> Self {
        Self {
            pool: WorkerPool::new(threads),
            shard_size: shard_size.max(1),
        }
    }

    /// Objects per shard.
    #[must_use]
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }
}

impl ThreadProvider for ShardedProvider {
    fn name(&self) -> &'static str {
        "sharded"
    }

    fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    fn assign(&mut self, registry: &ObjectRegistry) -> SchedulerResult<()> {
        let mut unit = BatchSetupHandler::new();
        for object in registry.iter() {
            unit.add(object);
            if unit.len() == self.shard_size {
                std::mem::take(&mut unit).push_task(&self.pool);
            }
        }
        unit.push_task(&self.pool);
        Ok(())
    }
}
