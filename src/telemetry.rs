// Telemetry and reset coordination
//
// The control loop is the only writer of telemetry; request handlers only
// read it. Resets are requested here and carried out by the loop at the top
// of its next tick, so the engine is never touched from a request thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::control::CommandStore;
use crate::messages::{Pose, RuntimeHealth, VehicleVelocity};

/// Everything the loop publishes at the end of a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryState {
    pub pose: Pose,
    pub velocity: VehicleVelocity,
    pub health: RuntimeHealth,
    pub tick: u64,
}

/// Handle for a reset request, resolved once the loop has applied it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTicket(u64);

pub struct Telemetry {
    state: Mutex<TelemetryState>,
    commands: Arc<CommandStore>,
    reset_requested: AtomicU64,
    reset_applied: watch::Sender<u64>,
}

impl Telemetry {
    /// Start with the vehicle at rest at `spawn`
    pub fn new(spawn: Pose, commands: Arc<CommandStore>) -> Self {
        let (reset_applied, _) = watch::channel(0);
        Self {
            state: Mutex::new(TelemetryState {
                pose: spawn,
                velocity: VehicleVelocity::zero(),
                health: RuntimeHealth::Idle,
                tick: 0,
            }),
            commands,
            reset_requested: AtomicU64::new(0),
            reset_applied,
        }
    }

    /// Last published pose
    pub fn snapshot(&self) -> Pose {
        self.state.lock().pose
    }

    /// Last published telemetry record
    pub fn state(&self) -> TelemetryState {
        *self.state.lock()
    }

    /// Publish a full record (loop only)
    pub(crate) fn publish(&self, state: TelemetryState) {
        *self.state.lock() = state;
    }

    /// Record health without a pose update, used when a tick is skipped
    pub(crate) fn set_health(&self, health: RuntimeHealth) {
        self.state.lock().health = health;
    }

    /// Request a vehicle reset
    ///
    /// The command store is cleared right away so no in-flight command can
    /// move the vehicle again; the physical reset happens on the loop thread.
    pub fn reset(&self) -> ResetTicket {
        self.commands.stop();
        let generation = self.reset_requested.fetch_add(1, Ordering::AcqRel) + 1;
        info!("Reset requested (generation {})", generation);
        ResetTicket(generation)
    }

    /// Wait until the loop has applied `ticket`, or `timeout` elapses
    ///
    /// Returns whether the reset was applied in time.
    pub async fn wait_applied(&self, ticket: ResetTicket, timeout: Duration) -> bool {
        let mut rx = self.reset_applied.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|applied| *applied >= ticket.0)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!("Reset {:?} not applied within {:?}", ticket, timeout);
                false
            }
        }
    }

    /// Whether `ticket` has been applied
    pub fn is_applied(&self, ticket: ResetTicket) -> bool {
        *self.reset_applied.borrow() >= ticket.0
    }

    /// Newest unapplied reset generation, if any (loop only)
    pub(crate) fn pending_reset(&self) -> Option<u64> {
        let requested = self.reset_requested.load(Ordering::Acquire);
        (requested > *self.reset_applied.borrow()).then_some(requested)
    }

    /// Mark every generation up to `generation` applied and publish the
    /// post-reset state (loop only)
    pub(crate) fn complete_reset(&self, generation: u64, state: TelemetryState) {
        self.publish(state);
        self.reset_applied.send_replace(generation);
    }
}
