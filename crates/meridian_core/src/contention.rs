//! # Contention Resolver
//!
//! Periodic safety net for waits the in-protocol self-drain misses.
//!
//! ```text
//! every period:
//!   for each worker B with queued requests:
//!     if B is parked (queued on another worker, no object lock held)
//!       → release B's queue, B settles the arrivals when it unparks
//! ```
//!
//! The resolver never awaits an arrival itself, so one slow requester
//! cannot stall the other queues. Two or more workers parked on each
//! other all get released within one period.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::RwLock;

use crate::error::{SchedulerError, SchedulerResult};
use crate::thread::Worker;

/// Live worker set, replaced whenever the provider is swapped.
pub type WorkerDirectory = Arc<RwLock<Vec<Arc<Worker>>>>;

/// Background thread releasing the queues of parked workers.
#[derive(Debug)]
pub struct ContentionResolver {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ContentionResolver {
    /// Starts the resolver thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadSpawn`] if the thread cannot be
    /// spawned.
    pub fn start(directory: WorkerDirectory, period: Duration) -> SchedulerResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let name = "meridian-contention".to_string();

        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(&directory, period, &stop_rx))
            .map_err(|source| SchedulerError::ThreadSpawn { name, source })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    /// Stops and joins the resolver thread.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop_tx.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("contention resolver panicked");
            }
        }
    }
}

impl Drop for ContentionResolver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(directory: &WorkerDirectory, period: Duration, stop_rx: &Receiver<()>) {
    let ticker = tick(period);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                let workers = directory.read().clone();
                resolve(&workers);
            }
        }
    }
}

/// One resolver pass. Returns the number of requests released.
pub fn resolve(workers: &[Arc<Worker>]) -> usize {
    let mut released = 0;
    for owner in workers {
        if owner.queue().pending_len() == 0 {
            continue;
        }
        let count = owner.queue().release_parked();
        if count > 0 {
            tracing::debug!(owner = %owner.id(), released = count, "released queue of parked worker");
        }
        released += count;
    }
    released
}
