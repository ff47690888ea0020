// Velocity ramping and passive decay
//
// One call per tick. Clamps the desired velocity, slews the actual velocity
// toward it under per-axis acceleration limits, then applies decay on any
// axis whose desired value is zero.

use crate::config::{
    ACCEL_VX, ACCEL_WZ, ANGULAR_DAMP, LINEAR_DAMP, MAX_VX, MAX_WZ, ZERO_CMD_EPSILON,
};
use crate::messages::VehicleVelocity;

/// Limits applied by [`ramp_with_limits`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampLimits {
    pub max_vx: f64,
    pub max_wz: f64,
    pub accel_vx: f64,
    pub accel_wz: f64,
    pub linear_damp: f64,
    pub angular_damp: f64,
}

impl Default for RampLimits {
    fn default() -> Self {
        Self {
            max_vx: MAX_VX,
            max_wz: MAX_WZ,
            accel_vx: ACCEL_VX,
            accel_wz: ACCEL_WZ,
            linear_damp: LINEAR_DAMP,
            angular_damp: ANGULAR_DAMP,
        }
    }
}

impl RampLimits {
    /// Clamp a desired body velocity into the safety envelope
    pub fn clamp(&self, desired: VehicleVelocity) -> VehicleVelocity {
        VehicleVelocity {
            vx: clamp_axis(desired.vx, self.max_vx),
            wz: clamp_axis(desired.wz, self.max_wz),
        }
    }
}

/// Advance `current` one tick toward `desired` using the default limits
pub fn ramp(current: VehicleVelocity, desired: VehicleVelocity, dt: f64) -> VehicleVelocity {
    ramp_with_limits(current, desired, dt, &RampLimits::default())
}

/// Advance `current` one tick toward `desired` with custom limits
pub fn ramp_with_limits(
    current: VehicleVelocity,
    desired: VehicleVelocity,
    dt: f64,
    limits: &RampLimits,
) -> VehicleVelocity {
    let target = limits.clamp(desired);

    let mut vx = slew(current.vx, target.vx, limits.accel_vx * dt);
    let mut wz = slew(current.wz, target.wz, limits.accel_wz * dt);

    // Decay keys off the desired magnitude, not the ramped one
    if target.vx.abs() < ZERO_CMD_EPSILON {
        vx *= 1.0 - limits.linear_damp;
    }
    if target.wz.abs() < ZERO_CMD_EPSILON {
        wz *= 1.0 - limits.angular_damp;
    }

    VehicleVelocity { vx, wz }
}

/// Symmetric clamp to [-limit, limit]; NaN collapses to zero
fn clamp_axis(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-limit, limit)
}

/// Move `current` toward `target` by at most `max_step`
fn slew(current: f64, target: f64, max_step: f64) -> f64 {
    if target > current {
        (current + max_step).min(target)
    } else {
        (current - max_step).max(target)
    }
}
