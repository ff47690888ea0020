// Fixed-rate control loop
// Note: the loop owns the simulation engine. Request handlers only reach it
// indirectly through the command store and the reset request on `Telemetry`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::control::{CommandStore, RampLimits, ramp_with_limits, wheel_speeds_with_params};
use crate::messages::{Pose, RuntimeHealth, VehicleVelocity, WheelSpeeds};
use crate::sim::{EngineError, SimEngine, VehicleHandle};
use crate::telemetry::{Telemetry, TelemetryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Ticking,
    Stopped,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Wheels commanded, engine stepped, pose published
    Actuated,
    /// A pending reset was carried out instead of a normal tick
    ResetApplied,
    /// Engine call failed; nothing published
    Skipped,
    /// Loop already stopped
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub skipped: u64,
    pub resets: u64,
    pub overruns: u64,
    pub reanchors: u64,
}

/// Cloneable shutdown flag shared with the signal handler
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct ControlLoop<E: SimEngine> {
    engine: E,
    vehicle: VehicleHandle,
    commands: Arc<CommandStore>,
    telemetry: Arc<Telemetry>,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
    limits: RampLimits,
    velocity: VehicleVelocity,
    health: RuntimeHealth,
    state: LoopState,
    stats: LoopStats,
}

impl<E: SimEngine> ControlLoop<E> {
    pub fn new(
        engine: E,
        vehicle: VehicleHandle,
        commands: Arc<CommandStore>,
        telemetry: Arc<Telemetry>,
        clock: Arc<dyn Clock>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            engine,
            vehicle,
            commands,
            telemetry,
            clock,
            config,
            limits: RampLimits::default(),
            velocity: VehicleVelocity::zero(),
            health: RuntimeHealth::Idle,
            state: LoopState::Ticking,
            stats: LoopStats::default(),
        }
    }

    /// Override the ramp limits (builder-style)
    pub fn with_limits(mut self, limits: RampLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Current actual body velocity
    pub fn velocity(&self) -> VehicleVelocity {
        self.velocity
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Run one tick without pacing
    pub fn tick(&mut self) -> TickOutcome {
        if self.state == LoopState::Stopped {
            return TickOutcome::Stopped;
        }
        self.stats.ticks += 1;

        // Resets are consumed at the tick boundary, never mid-tick
        if let Some(generation) = self.telemetry.pending_reset() {
            self.apply_reset(generation);
            return TickOutcome::ResetApplied;
        }

        let now = self.clock.now();
        let intent = self.commands.intent();
        let desired = intent.effective(now);

        let next = ramp_with_limits(self.velocity, desired, self.config.dt(), &self.limits);
        let wheels = wheel_speeds_with_params(
            next.vx,
            next.wz,
            self.config.wheel_base,
            self.config.wheel_radius,
        );

        match self.actuate(wheels) {
            Ok(pose) => {
                if self.health == RuntimeHealth::EngineFault {
                    info!("Engine recovered after {} skipped ticks", self.stats.skipped);
                }
                self.velocity = next;

                let expired = intent.is_expired(now)
                    && (intent.desired_vx != 0.0 || intent.desired_wz != 0.0);
                let health = if expired {
                    RuntimeHealth::CmdExpired
                } else if desired == VehicleVelocity::zero() {
                    RuntimeHealth::Idle
                } else {
                    RuntimeHealth::Ok
                };
                if health == RuntimeHealth::CmdExpired && self.health != RuntimeHealth::CmdExpired {
                    info!("Command expired, decelerating from {:?}", self.velocity);
                }
                self.health = health;

                self.telemetry.publish(TelemetryState {
                    pose,
                    velocity: next,
                    health,
                    tick: self.stats.ticks,
                });
                TickOutcome::Actuated
            }
            Err(e) => {
                // Log the first failure of a streak loudly, the rest quietly
                if self.health != RuntimeHealth::EngineFault {
                    error!("Engine failure, skipping tick: {}", e);
                } else {
                    debug!("Engine still failing: {}", e);
                }
                self.health = RuntimeHealth::EngineFault;
                self.stats.skipped += 1;
                self.telemetry.set_health(RuntimeHealth::EngineFault);
                TickOutcome::Skipped
            }
        }
    }

    /// Command wheels, step, read pose back
    fn actuate(&mut self, wheels: WheelSpeeds) -> Result<Pose, EngineError> {
        let torque = self.config.motor_torque;
        for &joint in &self.vehicle.left_wheels {
            self.engine.set_motor_velocity(joint, wheels.left, torque)?;
        }
        for &joint in &self.vehicle.right_wheels {
            self.engine.set_motor_velocity(joint, wheels.right, torque)?;
        }
        self.engine.step_once()?;
        self.engine.get_pose(self.vehicle.body)
    }

    fn apply_reset(&mut self, generation: u64) {
        let spawn = self.config.spawn_pose;
        self.velocity = VehicleVelocity::zero();
        self.stats.resets += 1;

        // Command clearing already happened on the requesting side. The pose
        // published here is the one read back from the engine; on failure the
        // last observed pose stays.
        let (pose, health) = match self.reset_vehicle(spawn) {
            Ok(pose) => {
                info!("Vehicle reset to {:?}", pose);
                (pose, RuntimeHealth::Idle)
            }
            Err(e) => {
                warn!("Reset not applied to the vehicle: {}", e);
                (self.telemetry.snapshot(), RuntimeHealth::EngineFault)
            }
        };
        self.health = health;

        self.telemetry.complete_reset(
            generation,
            TelemetryState {
                pose,
                velocity: VehicleVelocity::zero(),
                health,
                tick: self.stats.ticks,
            },
        );
    }

    /// Teleport the labelled vehicle body to `spawn` and read its pose back
    fn reset_vehicle(&mut self, spawn: Pose) -> Result<Pose, EngineError> {
        let label = &self.config.vehicle_label;
        let body = self
            .engine
            .find_body_by_label(label)?
            .ok_or_else(|| EngineError::NoSuchLabel(label.clone()))?;
        self.engine.reset_body(body, spawn, VehicleVelocity::zero())?;
        self.engine.get_pose(body)
    }

    /// Run ticks at the configured rate until `shutdown` fires (or
    /// `max_ticks` ticks have run), then stop.
    ///
    /// Deadlines are absolute, so short overruns are absorbed by starting the
    /// next tick immediately. Falling more than a full period behind
    /// re-anchors the schedule instead of bursting through missed ticks.
    pub fn run(&mut self, shutdown: &ShutdownSignal, max_ticks: Option<u64>) -> LoopStats {
        let period = self.config.period();
        info!(
            "Control loop started: {}Hz ({:?} period)",
            self.config.loop_hz, period
        );

        let mut deadline = self.clock.now();
        let mut remaining = max_ticks;

        while !shutdown.is_triggered() && self.state == LoopState::Ticking {
            if remaining == Some(0) {
                break;
            }
            self.tick();
            remaining = remaining.map(|n| n - 1);

            deadline += period;
            let now = self.clock.now();
            if now > deadline {
                self.stats.overruns += 1;
                let behind = now - deadline;
                if behind > period {
                    warn!("Control loop {:?} behind schedule, re-anchoring", behind);
                    self.stats.reanchors += 1;
                    deadline = now;
                } else {
                    debug!("Tick overran by {:?}", behind);
                }
                continue;
            }
            self.clock.sleep_until(deadline);
        }

        self.stop();
        self.stats
    }

    /// Enter STOPPED: zero the wheels (best effort) and tear down the engine
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        if let Err(e) = self.zero_wheels() {
            warn!("Failed to zero wheels on shutdown: {}", e);
        }
        self.engine.disconnect();
        self.state = LoopState::Stopped;
        info!(
            "Control loop stopped after {} ticks ({} skipped, {} overruns)",
            self.stats.ticks, self.stats.skipped, self.stats.overruns
        );
    }

    fn zero_wheels(&mut self) -> Result<(), EngineError> {
        let torque = self.config.motor_torque;
        for &joint in self.vehicle.left_wheels.iter().chain(&self.vehicle.right_wheels) {
            self.engine.set_motor_velocity(joint, 0.0, torque)?;
        }
        Ok(())
    }
}

/// Spawn the control loop on its own OS thread
pub fn spawn<E: SimEngine + 'static>(
    mut control: ControlLoop<E>,
    shutdown: ShutdownSignal,
) -> std::io::Result<std::thread::JoinHandle<LoopStats>> {
    std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || control.run(&shutdown, None))
}
