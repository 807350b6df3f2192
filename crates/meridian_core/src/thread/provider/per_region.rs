//! One unit of work per loaded region.

use std::collections::{BTreeMap, BTreeSet};

use super::ThreadProvider;
use crate::error::SchedulerResult;
use crate::registry::{ContainerId, ObjectRegistry, RegionCoord};
use crate::thread::{BatchSetupHandler, WorkerPool};

/// Groups objects by region instead of by container.
///
/// Only regions announced through `on_region_load` are ticked; objects
/// placed in any other region are skipped until it loads. Container
/// objects and free-standing objects are assigned one by one.
#[derive(Debug)]
pub struct PerRegionProvider {
    pool: WorkerPool,
    loaded: BTreeSet<(ContainerId, RegionCoord)>,
}

impl PerRegionProvider {
    /// Creates a provider for `threads` workers.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkerPool::new(threads),
            loaded: BTreeSet::new(),
        }
    }

    /// Returns `true` if the region is loaded.
    #[must_use]
    pub fn is_loaded(&self, container: ContainerId, region: RegionCoord) -> bool {
        self.loaded.contains(&(container, region))
    }

    /// Number of loaded regions.
    #[must_use]
    pub fn loaded_regions(&self) -> usize {
        self.loaded.len()
    }
}

impl ThreadProvider for PerRegionProvider {
    fn name(&self) -> &'static str {
        "per_region"
    }

    fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    fn assign(&mut self, registry: &ObjectRegistry) -> SchedulerResult<()> {
        let mut regions: BTreeMap<(ContainerId, RegionCoord), BatchSetupHandler> = BTreeMap::new();
        let mut skipped = 0_usize;

        for object in registry.iter() {
            match (object.placement.container, object.placement.region) {
                (Some(container), Some(region)) => {
                    if self.loaded.contains(&(container, region)) {
                        regions.entry((container, region)).or_default().add(object);
                    } else {
                        skipped += 1;
                    }
                }
                _ => {
                    let mut unit = BatchSetupHandler::new();
                    unit.add(object);
                    unit.push_task(&self.pool);
                }
            }
        }

        for unit in regions.into_values() {
            unit.push_task(&self.pool);
        }
        if skipped > 0 {
            tracing::trace!(skipped, "objects in unloaded regions not ticked");
        }
        Ok(())
    }

    fn on_container_remove(&mut self, container: ContainerId) {
        self.loaded.retain(|(owner, _)| *owner != container);
    }

    fn on_region_load(&mut self, container: ContainerId, region: RegionCoord) {
        self.loaded.insert((container, region));
    }

    fn on_region_unload(&mut self, container: ContainerId, region: RegionCoord) {
        self.loaded.remove(&(container, region));
    }
}
