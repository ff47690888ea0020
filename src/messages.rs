// Define message types for the runtime

use std::time::Duration;

use serde::{Deserialize, Serialize};

// Latest desired command held by the command store.
// Overwritten wholesale on every request, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandIntent {
    pub desired_vx: f64,
    pub desired_wz: f64,
    pub expires_at: Option<Duration>,
}

impl CommandIntent {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether the command has lapsed at `now` (strictly after the deadline)
    pub fn is_expired(&self, now: Duration) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }

    /// Velocity in force at `now`: the desired values, or zero once expired
    pub fn effective(&self, now: Duration) -> VehicleVelocity {
        if self.is_expired(now) {
            VehicleVelocity::zero()
        } else {
            VehicleVelocity::new(self.desired_vx, self.desired_wz)
        }
    }
}

/// Body-frame velocity: forward m/s and yaw rate rad/s (CCW positive)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleVelocity {
    pub vx: f64,
    pub wz: f64,
}

impl VehicleVelocity {
    pub fn new(vx: f64, wz: f64) -> Self {
        Self { vx, wz }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Wheel angular speeds in rad/s for each side of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Planar pose of the vehicle base
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }
}

// Command from teleop/scripts -> runtime over zenoh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseCommand {
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub wz: f64,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    Idle,
    CmdExpired,
    EngineFault,
}

/// Reply to every drive-style request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveReply {
    pub accepted: bool,
    pub vx_cmd: f64,
    pub wz_cmd: f64,
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_effective_matches_expiry() {
        let intent = CommandIntent {
            desired_vx: 0.4,
            desired_wz: -0.1,
            expires_at: Some(Duration::from_secs(2)),
        };
        assert_eq!(intent.effective(Duration::from_secs(2)), VehicleVelocity::new(0.4, -0.1));
        assert!(intent.is_expired(Duration::from_millis(2001)));
        assert_eq!(intent.effective(Duration::from_millis(2001)), VehicleVelocity::zero());
    }
}
