//! # Fixed-Rate Tick Loop
//!
//! Deadline-based cadence for the driver thread.
//!
//! ## Design
//!
//! The loop must:
//! - Start every cycle one period after the previous one started
//! - Not burst to catch up after a slow cycle
//! - Keep timing statistics for the status log

use std::time::{Duration, Instant};

/// Fixed-rate tick loop controller.
///
/// Deadlines advance by exactly one period. When a cycle overruns by more
/// than a full period the schedule restarts from now instead of firing a
/// burst of back-to-back cycles.
#[derive(Debug)]
pub struct TickLoop {
    /// Target tick period.
    tick_duration: Duration,
    /// When the next cycle is due.
    next_deadline: Instant,
    /// Total cycles started.
    tick_count: u64,
    /// Deadlines dropped because the loop fell behind.
    skipped: u64,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    /// Empty statistics seeded with the tick budget.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }

    /// Records one cycle. Returns `true` if it overran `budget`.
    pub fn record(&mut self, duration: Duration, budget: Duration) -> bool {
        let duration_us = micros(duration);

        self.total_ticks += 1;
        self.min_tick_us = self.min_tick_us.min(duration_us);
        self.max_tick_us = self.max_tick_us.max(duration_us);

        // Rolling average
        self.avg_tick_us = (self.avg_tick_us * 15 + duration_us) / 16;

        let late = duration > budget;
        if late {
            self.late_ticks += 1;
        }
        late
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_TICK_MS))
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Creates a loop whose first cycle is due immediately.
    #[must_use]
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            next_deadline: Instant::now(),
            tick_count: 0,
            skipped: 0,
        }
    }

    /// Creates a loop from a period in milliseconds.
    #[must_use]
    pub fn from_millis(tick_ms: u64) -> Self {
        Self::new(Duration::from_millis(tick_ms))
    }

    /// Deadline of the next cycle.
    #[must_use]
    pub const fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Marks the start of a cycle and schedules the following one.
    ///
    /// Returns the cycle start time for duration measurement.
    pub fn begin_tick(&mut self) -> Instant {
        let now = Instant::now();
        self.tick_count += 1;
        self.next_deadline += self.tick_duration;
        if self.next_deadline + self.tick_duration <= now {
            let behind = now.duration_since(self.next_deadline);
            let dropped = behind.as_nanos() / self.tick_duration.as_nanos().max(1);
            self.skipped += u64::try_from(dropped).unwrap_or(u64::MAX);
            self.next_deadline = now + self.tick_duration;
        }
        now
    }

    /// Returns the current tick count.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Deadlines dropped so far.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Returns the target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::from_millis(crate::config::DEFAULT_TICK_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::from_millis(50);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_millis(50));
        assert!(tick_loop.next_deadline() <= Instant::now());
    }

    #[test]
    fn test_deadlines_advance_by_one_period() {
        let mut tick_loop = TickLoop::from_millis(20);
        let first_deadline = tick_loop.next_deadline();
        let _start = tick_loop.begin_tick();
        assert_eq!(tick_loop.next_deadline(), first_deadline + Duration::from_millis(20));
        assert_eq!(tick_loop.tick_count(), 1);
        assert_eq!(tick_loop.skipped(), 0);
    }

    #[test]
    fn test_slow_cycle_does_not_burst() {
        let mut tick_loop = TickLoop::from_millis(5);
        thread::sleep(Duration::from_millis(30));
        let start = tick_loop.begin_tick();
        assert!(tick_loop.skipped() > 0);
        assert!(tick_loop.next_deadline() > start);
    }

    #[test]
    fn test_stats_tracking() {
        let budget = Duration::from_millis(10);
        let mut stats = TickStats::new(budget);

        assert!(!stats.record(Duration::from_millis(2), budget));
        assert!(stats.record(Duration::from_millis(12), budget));
        assert!(!stats.record(Duration::from_millis(4), budget));

        assert_eq!(stats.total_ticks, 3);
        assert_eq!(stats.late_ticks, 1);
        assert_eq!(stats.min_tick_us, 2_000);
        assert_eq!(stats.max_tick_us, 12_000);
        assert!(stats.min_tick_us <= stats.avg_tick_us);
    }
}
