//! One-shot rendezvous created per queue drain.
//!
//! The draining worker registers one [`ArrivalToken`] per released request
//! and hands the tokens out. A requester arrives by dropping its token, so
//! arrival still happens when the requester's action unwinds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Tracks outstanding arrivals for a single drain.
#[derive(Debug, Default)]
pub struct DrainBarrier {
    pending: Mutex<usize>,
    arrived: Condvar,
}

impl DrainBarrier {
    /// Creates an empty barrier.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one more party that must arrive.
    #[must_use = "dropping the token immediately counts as an arrival"]
    pub fn register(self: &Arc<Self>) -> ArrivalToken {
        *self.pending.lock() += 1;
        ArrivalToken {
            barrier: Arc::clone(self),
        }
    }

    /// Parties that have not arrived yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Blocks until every registered party has arrived.
    pub fn await_arrivals(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.arrived.wait(&mut pending);
        }
    }

    /// Blocks until every party has arrived or `timeout` elapses.
    ///
    /// Returns `true` when all parties arrived.
    #[must_use]
    pub fn await_arrivals_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            if self.arrived.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }

    fn arrive(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.arrived.notify_all();
        }
    }
}

/// Proof that a released requester still has to arrive.
///
/// Dropping the token is the arrival.
#[derive(Debug)]
pub struct ArrivalToken {
    barrier: Arc<DrainBarrier>,
}

impl ArrivalToken {
    /// Arrives explicitly. Same as dropping the token.
    pub fn arrive(self) {
        drop(self);
    }
}

impl Drop for ArrivalToken {
    fn drop(&mut self) {
        self.barrier.arrive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_empty_barrier_does_not_block() {
        let barrier = DrainBarrier::new();
        barrier.await_arrivals();
        assert_eq!(barrier.pending(), 0);
    }

    #[test]
    fn test_barrier_waits_for_every_token() {
        let barrier = DrainBarrier::new();
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let token = barrier.register();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                    token.arrive();
                })
            })
            .collect();

        assert!(barrier.await_arrivals_timeout(Duration::from_secs(5)));
        assert_eq!(done.load(Ordering::SeqCst), 3);

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_token_arrives_on_unwind() {
        let barrier = DrainBarrier::new();
        let token = barrier.register();

        let result = thread::spawn(move || {
            let _token = token;
            panic!("requester failed");
        })
        .join();

        assert!(result.is_err());
        assert!(barrier.await_arrivals_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_timeout_with_outstanding_token() {
        let barrier = DrainBarrier::new();
        let token = barrier.register();
        assert!(!barrier.await_arrivals_timeout(Duration::from_millis(10)));
        drop(token);
        assert!(barrier.await_arrivals_timeout(Duration::from_millis(10)));
    }
}
