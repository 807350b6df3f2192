//! Countdown latch used as the per-cycle completion barrier.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Blocks waiters until a fixed number of `count_down` calls happened.
///
/// Single use: once the count reaches zero it stays there.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountDownLatch {
    /// Creates a latch that opens after `count` decrements.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrements the count, waking every waiter when it reaches zero.
    ///
    /// Extra calls after zero are ignored.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Remaining decrements.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Blocks until the count reaches zero or `timeout` elapses.
    ///
    /// Returns `true` if the latch opened.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_latch_is_open() {
        let latch = CountDownLatch::new(0);
        latch.wait();
        assert!(latch.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_latch_opens_after_all_workers() {
        let latch = Arc::new(CountDownLatch::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.count_down())
            })
            .collect();

        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert_eq!(latch.count(), 0);

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_latch_times_out_when_short() {
        let latch = CountDownLatch::new(2);
        latch.count_down();
        assert!(!latch.wait_timeout(Duration::from_millis(20)));
        assert_eq!(latch.count(), 1);
    }

    #[test]
    fn test_extra_count_down_is_ignored() {
        let latch = CountDownLatch::new(1);
        latch.count_down();
        latch.count_down();
        assert_eq!(latch.count(), 0);
    }
}
