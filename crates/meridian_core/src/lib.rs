//! # MERIDIAN Core
//!
//! Tick scheduling and cross-thread object access for a real-time
//! simulation server:
//! - Fixed-rate driver spreading every live object over a worker pool
//! - Cost-balanced, pluggable assignment strategies
//! - An acquisition protocol that lets any thread touch an object owned by
//!   another worker, for the price of one id comparison on the owner
//!
//! ## Architecture Rules
//!
//! 1. **One owner per tick** - each object is ticked by exactly one worker,
//!    after its affinity record was updated for that tick
//! 2. **Access goes through `acquire`** - the tick's [`Lease`] inside a
//!    tick, [`Acquirable::acquire`] everywhere else
//! 3. **No waiting under a lease** - a worker releases the object it ticks
//!    before it queues on another worker or serves its own queue
//! 4. **Drains happen at bounded points** - between objects, before
//!    blocking, at the end of a batch, and when the resolver releases the
//!    queue of a parked worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meridian_core::{Acquirable, Placement, ObjectKind, SchedulerConfig, UpdateManager};
//!
//! let manager = UpdateManager::new(SchedulerConfig::default())?;
//! let npc = Arc::new(Acquirable::new(Npc::default()));
//! manager.register(npc.clone(), Placement::loose(ObjectKind::Agent));
//! manager.start()?;
//!
//! let ctx = manager.acquisition_context();
//! let hp = npc.acquire(&ctx, |npc| npc.hp);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod contention;
pub mod error;
pub mod lock;
pub mod monitoring;
pub mod registry;
pub mod sync;
pub mod thread;
pub mod tick;
pub mod update;

#[cfg(test)]
mod test_support;

pub use config::{CostTable, SchedulerConfig, StrategyConfig};
pub use contention::ContentionResolver;
pub use error::{ConfigError, ErrorSink, LogErrorSink, SchedulerError, SchedulerResult};
pub use lock::{
    acquire_all, acquire_for_each, Acquirable, AcquisitionContext, AcquisitionStats, HandleId, Handler, Lease,
    Schedulable, Tickable,
};
pub use monitoring::{TickMonitor, WaitMonitor};
pub use registry::{ContainerId, LiveObject, ObjectKind, ObjectRegistry, Placement, RegionCoord};
pub use thread::provider::{PerContainerProvider, PerRegionProvider, RoundRobinProvider, ShardedProvider};
pub use thread::{BatchThread, ThreadProvider, Worker, WorkerEnv, WorkerId, WorkerPool, WorkerState};
pub use tick::{TickLoop, TickStats};
pub use update::{CallbackId, TickReport, UpdateManager};
