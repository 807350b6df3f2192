//! # Rendezvous Primitives for the Tick Window
//!
//! Two blocking primitives sit underneath the scheduler:
//!
//! ```text
//! Driver                     Worker 1         Worker 2
//!   latch(2) ──signal──────▶ tick batch       tick batch
//!   wait ◀──────count_down── drain, idle      drain, idle ──count_down
//! ```
//!
//! - [`CountDownLatch`]: one per cycle. The driver blocks until every
//!   worker has finished its batch.
//! - [`DrainBarrier`]: one per queue drain. The draining worker blocks until
//!   every requester it released has finished touching the object.
//!
//! Both are built on `parking_lot` mutex + condvar pairs. Neither spins.

mod barrier;
mod latch;

pub use barrier::{ArrivalToken, DrainBarrier};
pub use latch::CountDownLatch;
