// Time source and sleep primitive for the control loop
//
// Everything time-dependent (command expiry, tick pacing) reads the same
// clock, so tests can swap in `ManualClock` and run thousands of ticks
// without touching the wall clock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic clock with a sleep primitive
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread until `deadline` (clock time)
    fn sleep_until(&self, deadline: Duration);
}

/// Wall clock backed by `Instant`, sleeping with `spin_sleep` for low jitter
pub struct MonotonicClock {
    origin: Instant,
    sleeper: spin_sleep::SpinSleeper,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: spin_sleep::SpinSleeper::default(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            self.sleeper.sleep(deadline - now);
        }
    }
}

/// Manually advanced clock for deterministic tests
///
/// `sleep_until` jumps time forward to the deadline instead of blocking.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, t: Duration) {
        *self.now.lock() = t;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut now = self.now.lock();
        if deadline > *now {
            *now = deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::new();
        clock.sleep_until(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(5));

        // Sleeping into the past is a no-op
        clock.sleep_until(Duration::from_millis(1));
        assert_eq!(clock.now(), Duration::from_millis(5));
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        clock.sleep_until(a + Duration::from_millis(2));
        assert!(clock.now() >= a + Duration::from_millis(2));
    }
}
