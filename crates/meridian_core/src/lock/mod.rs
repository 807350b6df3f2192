//! # Cross-Thread Acquisition
//!
//! Every simulated object lives inside an [`Acquirable`] handle. During a
//! tick the object belongs to exactly one worker. A tick reaches other
//! objects through its [`Lease`]; threads outside the pool go through
//! [`Acquirable::acquire`]:
//!
//! ```text
//! affinity unset ─────────────▶ synchronized (object lock only)
//! caller owns it ─────────────▶ fast path, no queueing
//! already waiting on owner ───▶ re-entrant, treated as owner
//! owner outside tick window ──▶ synchronized (object lock only)
//! otherwise ──────────────────▶ release the lease, drain own queue,
//!                                enqueue on owner, block until the
//!                                owner drains
//! ```
//!
//! A worker never waits while holding the lock of the object it ticks, so
//! two workers reading each other's objects mid-tick both make progress.
//!
//! The bulk helpers in [`acquisition`] do one synchronization per distinct
//! owning worker instead of one per handle.

mod acquirable;
pub mod acquisition;
mod context;
mod lease;

pub use acquirable::{Acquirable, HandleId, Handler, Schedulable, Tickable};
pub use acquisition::{acquire_all, acquire_for_each};
pub use context::{AcquisitionContext, AcquisitionStats};
pub use lease::Lease;
