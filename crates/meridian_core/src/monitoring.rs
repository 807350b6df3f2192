//! Per-tick monitoring data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Accumulates time threads spent blocked on foreign queues.
///
/// Shared by every acquisition context of one driver. Reset each time a
/// monitoring consumer reads it.
#[derive(Debug)]
pub struct WaitMonitor {
    nanos: AtomicU64,
    enabled: bool,
}

impl WaitMonitor {
    /// Creates a monitor. A disabled monitor records nothing.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            nanos: AtomicU64::new(0),
            enabled,
        }
    }

    /// Returns `true` if waits are recorded.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Adds one wait.
    pub fn record(&self, waited: Duration) {
        if self.enabled {
            let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
            self.nanos.fetch_add(nanos, Ordering::Relaxed);
        }
    }

    /// Accumulated wait time, without resetting.
    #[must_use]
    pub fn current(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    /// Returns the accumulated wait time and resets it to zero.
    pub fn take(&self) -> Duration {
        Duration::from_nanos(self.nanos.swap(0, Ordering::Relaxed))
    }
}

impl Default for WaitMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What monitoring consumers receive after each cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickMonitor {
    /// Wall-clock duration of the cycle, in milliseconds.
    pub tick_time_ms: f64,
    /// Cross-thread wait accumulated since the previous report, in
    /// milliseconds.
    pub acquisition_time_ms: f64,
}

impl TickMonitor {
    /// Builds a report from raw durations.
    #[must_use]
    pub fn new(tick_time: Duration, acquisition_time: Duration) -> Self {
        Self {
            tick_time_ms: tick_time.as_secs_f64() * 1000.0,
            acquisition_time_ms: acquisition_time.as_secs_f64() * 1000.0,
        }
    }
}
