//! # Worker Threads and Assignment
//!
//! ```text
//! ThreadProvider ──owns──▶ WorkerPool ──owns──▶ BatchThread ──▶ Worker
//!       │                      │                                  │
//!   assign()             notify_threads()                   BatchQueue
//! ```
//!
//! A [`Worker`] is the shared half of a thread: its id, state, cost counter
//! and pending-request queue. Affinity records point at it; the
//! [`BatchThread`] that owns the OS thread stays with the pool.

mod batch_thread;
mod pool;
pub mod provider;
mod queue;
mod setup;

pub use batch_thread::{BatchThread, Worker, WorkerId, WorkerState};
pub use pool::{WorkerEnv, WorkerPool};
pub use provider::ThreadProvider;
pub use queue::{BatchQueue, WaitOutcome};
pub use setup::BatchSetupHandler;
