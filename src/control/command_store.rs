// Latest-command holder shared between request handlers and the control loop
//
// Last writer wins. Expiry is evaluated lazily by `effective`, the store never
// rewrites itself when a deadline passes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::messages::{CommandIntent, VehicleVelocity};

pub struct CommandStore {
    intent: Mutex<CommandIntent>,
    clock: Arc<dyn Clock>,
}

impl CommandStore {
    /// Create a store holding the zero command
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            intent: Mutex::new(CommandIntent::zero()),
            clock,
        }
    }

    /// Replace the current command
    ///
    /// `vx`/`wz` are stored verbatim; clamping belongs to the loop. A finite,
    /// positive `duration` (seconds) arms an expiry at `now + duration`;
    /// anything else, including a deadline past the clock's range, leaves the
    /// command in force until replaced.
    pub fn set(&self, vx: f64, wz: f64, duration: Option<f64>) {
        let now = self.clock.now();
        let expires_at = duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .and_then(|d| Duration::try_from_secs_f64(d).ok())
            .and_then(|d| now.checked_add(d));

        let intent = CommandIntent {
            desired_vx: vx,
            desired_wz: wz,
            expires_at,
        };
        *self.intent.lock() = intent;
        debug!("Command set: {:?}", intent);
    }

    /// Zero command, no expiry
    pub fn stop(&self) {
        self.set(0.0, 0.0, None);
    }

    /// Command in force at `now`: the stored values, or zero once expired
    pub fn effective(&self, now: Duration) -> VehicleVelocity {
        self.intent.lock().effective(now)
    }

    /// Copy of the stored intent
    pub fn intent(&self) -> CommandIntent {
        *self.intent.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (ManualClock, CommandStore) {
        let clock = ManualClock::new();
        let store = CommandStore::new(Arc::new(clock.clone()));
        (clock, store)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_starts_at_zero() {
        let (_, store) = store();
        assert_eq!(store.intent(), CommandIntent::zero());
        assert_eq!(store.effective(secs(100.0)), VehicleVelocity::zero());
    }

    #[test]
    fn test_expiry_is_strict_and_lazy() {
        let (_, store) = store();
        store.set(0.6, 0.3, Some(1.0));

        assert_eq!(store.effective(secs(0.5)), VehicleVelocity::new(0.6, 0.3));
        assert_eq!(store.effective(secs(1.0)), VehicleVelocity::new(0.6, 0.3));
        assert_eq!(store.effective(secs(1.0001)), VehicleVelocity::zero());

        // Reading past the deadline leaves the stored values alone
        assert_eq!(store.intent().desired_vx, 0.6);
    }

    #[test]
    fn test_expiry_relative_to_set_time() {
        let (clock, store) = store();
        clock.set(secs(10.0));
        store.set(1.0, 0.0, Some(2.0));
        assert_eq!(store.intent().expires_at, Some(secs(12.0)));
        assert_eq!(store.effective(secs(11.9)).vx, 1.0);
        assert_eq!(store.effective(secs(12.01)).vx, 0.0);
    }

    #[test]
    fn test_values_stored_unclamped() {
        let (_, store) = store();
        store.set(9.0, -9.0, None);
        assert_eq!(store.effective(secs(1e6)), VehicleVelocity::new(9.0, -9.0));
    }

    #[test]
    fn test_invalid_durations_mean_no_expiry() {
        let (_, store) = store();
        for d in [Some(0.0), Some(-1.0), Some(f64::NAN), Some(f64::INFINITY), None] {
            store.set(0.4, 0.0, d);
            assert_eq!(store.intent().expires_at, None, "duration {:?}", d);
        }
    }

    #[test]
    fn test_deadline_beyond_clock_range_means_no_expiry() {
        let (clock, store) = store();
        clock.set(secs(1_000_000.0));
        store.set(0.5, 0.0, Some(1.8446744073709e19));
        assert_eq!(store.intent().expires_at, None);
        assert_eq!(store.effective(secs(2_000_000.0)), VehicleVelocity::new(0.5, 0.0));
    }

    #[test]
    fn test_new_command_replaces_expiry() {
        let (_, store) = store();
        store.set(0.4, 0.0, Some(1.0));
        store.set(0.2, 0.1, None);
        assert_eq!(store.effective(secs(5.0)), VehicleVelocity::new(0.2, 0.1));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_, store) = store();
        store.set(0.7, 1.0, Some(3.0));
        store.stop();
        let once = store.intent();
        store.stop();
        assert_eq!(store.intent(), once);
        assert_eq!(once, CommandIntent::zero());
    }
}
