//! Demo world: zones, their regions, and agents wandering between them.
//!
//! Agents are the only objects that acquire anything, and they only
//! acquire zones and regions, often ones ticked by another worker.

use std::sync::Arc;

use meridian_core::{
    acquire_for_each, Acquirable, AcquisitionContext, ContainerId, Lease, Placement, RegionCoord, Tickable,
    UpdateManager,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Resources a region holds at most.
const REGION_CAPACITY: u64 = 64;

/// Chance per tick that an agent visits a random zone.
const TRAVEL_CHANCE: f64 = 0.1;

/// A container: keeps a clock and counts visitors.
#[derive(Debug)]
pub struct Zone {
    id: ContainerId,
    clock: u64,
    visitors: u64,
}

impl Tickable for Zone {
    fn tick(this: &mut Lease<'_, Self>, _time: u64) {
        this.clock += 1;
    }
}

/// A region subdivision of a zone: regrows resources every tick.
#[derive(Debug)]
pub struct Region {
    coord: RegionCoord,
    resources: u64,
}

impl Tickable for Region {
    fn tick(this: &mut Lease<'_, Self>, _time: u64) {
        if this.resources < REGION_CAPACITY {
            this.resources += 1;
        }
    }
}

/// Harvests its home regions and sometimes visits another zone.
pub struct Agent {
    regions: Vec<Arc<Acquirable<Region>>>,
    zones: Arc<Vec<Arc<Acquirable<Zone>>>>,
    rng: StdRng,
    harvested: u64,
    trips: u64,
}

impl Tickable for Agent {
    fn tick(this: &mut Lease<'_, Self>, _time: u64) {
        let regions = this.regions.len();
        if regions > 0 {
            let pick = this.rng.gen_range(0..regions);
            let region = Arc::clone(&this.regions[pick]);
            let took = this.acquire(&region, |region| {
                let take = region.resources.min(2);
                region.resources -= take;
                take
            });
            this.harvested += took;
        }

        let zones = this.zones.len();
        if zones > 0 && this.rng.gen_bool(TRAVEL_CHANCE) {
            let pick = this.rng.gen_range(0..zones);
            let zone = Arc::clone(&this.zones[pick]);
            this.acquire(&zone, |zone| zone.visitors += 1);
            this.trips += 1;
        }
    }
}

/// World size parameters.
#[derive(Clone, Copy, Debug)]
pub struct WorldShape {
    /// Number of zones.
    pub zones: u32,
    /// Regions per side of each zone's square grid.
    pub regions_per_side: i32,
    /// Agents per zone.
    pub agents_per_zone: u32,
    /// RNG seed for agent behaviour.
    pub seed: u64,
}

/// Aggregated world state for the status log.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorldSummary {
    /// Sum of every zone clock.
    pub zone_ticks: u64,
    /// Visits recorded by zones.
    pub visits: u64,
    /// Resources left in all regions.
    pub resources: u64,
    /// Resources harvested by all agents.
    pub harvested: u64,
    /// Trips made by all agents.
    pub trips: u64,
}

/// Handles to every object of the demo world.
pub struct World {
    zones: Arc<Vec<Arc<Acquirable<Zone>>>>,
    regions: Vec<Arc<Acquirable<Region>>>,
    agents: Vec<Arc<Acquirable<Agent>>>,
}

impl World {
    /// Builds the world and registers every object with `manager`.
    pub fn populate(manager: &UpdateManager, shape: WorldShape) -> Self {
        let mut rng = StdRng::seed_from_u64(shape.seed);

        let zones: Arc<Vec<_>> = Arc::new(
            (0..shape.zones)
                .map(|index| {
                    Arc::new(Acquirable::new(Zone {
                        id: ContainerId(index),
                        clock: 0,
                        visitors: 0,
                    }))
                })
                .collect(),
        );

        let mut regions = Vec::new();
        let mut agents = Vec::new();

        for zone in zones.iter() {
            let container = zone_id(zone);
            manager.signal_container_created(container);
            manager.register(zone.clone(), Placement::container(container));

            let mut home = Vec::new();
            for x in 0..shape.regions_per_side {
                for z in 0..shape.regions_per_side {
                    let coord = RegionCoord::new(x, z);
                    let region = Arc::new(Acquirable::new(Region {
                        coord,
                        resources: REGION_CAPACITY / 2,
                    }));
                    manager.signal_region_loaded(container, coord);
                    manager.register(region.clone(), Placement::region(container, coord));
                    home.push(region);
                }
            }

            for _ in 0..shape.agents_per_zone {
                let start = home
                    .get(rng.gen_range(0..home.len().max(1)))
                    .map_or(RegionCoord::new(0, 0), |region| region_coord(region));
                let agent = Arc::new(Acquirable::new(Agent {
                    regions: home.clone(),
                    zones: Arc::clone(&zones),
                    rng: StdRng::seed_from_u64(rng.gen()),
                    harvested: 0,
                    trips: 0,
                }));
                manager.register(agent.clone(), Placement::agent(container, start));
                agents.push(agent);
            }

            regions.extend(home);
        }

        tracing::info!(
            zones = zones.len(),
            regions = regions.len(),
            agents = agents.len(),
            "world populated"
        );
        Self { zones, regions, agents }
    }

    /// Collects a summary, one synchronization per owning worker.
    pub fn summary(&self, ctx: &AcquisitionContext) -> WorldSummary {
        let mut summary = WorldSummary::default();
        acquire_for_each(ctx, self.zones.iter().map(Arc::as_ref), |zone| {
            summary.zone_ticks += zone.clock;
            summary.visits += zone.visitors;
        });
        acquire_for_each(ctx, self.regions.iter().map(Arc::as_ref), |region| {
            summary.resources += region.resources;
        });
        acquire_for_each(ctx, self.agents.iter().map(Arc::as_ref), |agent| {
            summary.harvested += agent.harvested;
            summary.trips += agent.trips;
        });
        summary
    }
}

fn zone_id(zone: &Acquirable<Zone>) -> ContainerId {
    let ctx = AcquisitionContext::detached();
    zone.acquire(&ctx, |zone| zone.id)
}

fn region_coord(region: &Acquirable<Region>) -> RegionCoord {
    let ctx = AcquisitionContext::detached();
    region.acquire(&ctx, |region| region.coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{SchedulerConfig, StrategyConfig};

    #[test]
    fn test_world_runs_and_conserves_visits() {
        let manager = UpdateManager::new(SchedulerConfig {
            tick_ms: 5,
            strategy: StrategyConfig::PerContainer,
            ..SchedulerConfig::default()
        })
        .unwrap();

        let world = World::populate(
            &manager,
            WorldShape {
                zones: 3,
                regions_per_side: 2,
                agents_per_zone: 4,
                seed: 7,
            },
        );
        assert_eq!(manager.object_count(), 3 + 3 * 4 + 3 * 4);

        for _ in 0..20 {
            manager.tick_once().unwrap();
        }

        let summary = world.summary(&manager.acquisition_context());
        assert_eq!(summary.zone_ticks, 3 * 20);
        assert_eq!(summary.visits, summary.trips);
        assert!(summary.harvested > 0);
    }
}
