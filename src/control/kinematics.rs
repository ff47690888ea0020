// Differential-drive inverse kinematics for the Husky base
// Converts body-frame velocities (vx, wz) to left/right wheel angular speeds.

use crate::config::{WHEEL_BASE, WHEEL_RADIUS};
use crate::messages::WheelSpeeds;

impl WheelSpeeds {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns speeds as array [left, right]
    pub fn as_array(&self) -> [f64; 2] {
        [self.left, self.right]
    }
}

/// Convert body-frame velocities to wheel speeds using the Husky geometry
///
/// # Arguments
/// * `vx` - Forward velocity in m/s (positive = forward)
/// * `wz` - Yaw rate in rad/s (positive = counter-clockwise)
pub fn wheel_speeds(vx: f64, wz: f64) -> WheelSpeeds {
    wheel_speeds_with_params(vx, wz, WHEEL_BASE, WHEEL_RADIUS)
}

/// Convert body-frame velocities to wheel speeds with custom geometry
///
/// No clamping happens here; limits are applied to vx/wz upstream.
pub fn wheel_speeds_with_params(vx: f64, wz: f64, wheel_base: f64, wheel_radius: f64) -> WheelSpeeds {
    // Rim speed of each side (m/s)
    let half_track = wz * wheel_base / 2.0;
    let v_left = vx - half_track;
    let v_right = vx + half_track;

    // m/s -> rad/s
    WheelSpeeds {
        left: v_left / wheel_radius,
        right: v_right / wheel_radius,
    }
}
