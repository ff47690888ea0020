// Loop rate, vehicle geometry, safety limits, topics
use std::time::Duration;

use crate::messages::Pose;

// Runtime loop frequency (also the physics step rate)
pub const LOOP_HZ: u32 = 240;

// Husky geometry
pub const WHEEL_RADIUS: f64 = 0.095; // meters
pub const WHEEL_BASE: f64 = 0.55; // meters, left-right wheel distance

// Safety clamps on the commanded body velocity
pub const MAX_VX: f64 = 1.2; // m/s
pub const MAX_WZ: f64 = 2.0; // rad/s

// Acceleration ramps
pub const ACCEL_VX: f64 = 2.5; // m/s^2
pub const ACCEL_WZ: f64 = 5.0; // rad/s^2

// Passive decay applied per tick while the command is zero
pub const LINEAR_DAMP: f64 = 0.05;
pub const ANGULAR_DAMP: f64 = 0.08;

// Below this magnitude a desired velocity counts as zero
pub const ZERO_CMD_EPSILON: f64 = 1e-4;

// Maximum motor torque per wheel (Nm)
pub const MOTOR_TORQUE: f64 = 24.0;

// Label used to locate the vehicle body in the engine
pub const VEHICLE_LABEL: &str = "husky";

// HTTP API
pub const HTTP_BIND: &str = "127.0.0.1";
pub const HTTP_PORT: u16 = 5000;

// How long POST /reset waits for the loop to apply the reset
pub const RESET_WAIT: Duration = Duration::from_secs(1);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "husky/cmd/base"; // commands
pub const TOPIC_POSE: &str = "husky/state/pose"; // telemetry
pub const TOPIC_HEALTH: &str = "husky/state/health"; // health status

// Telemetry publish rate on the zenoh link
pub const TELEMETRY_HZ: u64 = 20;

// Command bridge HTTP client defaults
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(5);
pub const BRIDGE_CONTEXT_INTERVAL: Duration = Duration::from_secs(5); // Pose context cadence

/// Vehicle and loop parameters consumed by the control loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub loop_hz: u32,
    pub wheel_radius: f64,
    pub wheel_base: f64,
    pub motor_torque: f64,
    pub vehicle_label: String,
    pub spawn_pose: Pose,
}

impl RuntimeConfig {
    /// Nominal tick period
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.dt())
    }

    /// Nominal tick period in seconds
    pub fn dt(&self) -> f64 {
        1.0 / f64::from(self.loop_hz.max(1))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: LOOP_HZ,
            wheel_radius: WHEEL_RADIUS,
            wheel_base: WHEEL_BASE,
            motor_torque: MOTOR_TORQUE,
            vehicle_label: VEHICLE_LABEL.to_string(),
            spawn_pose: Pose::default(),
        }
    }
}
