// Kinematic stand-in for the physics engine
//
// Integrates a unicycle model from the commanded wheel speeds. There are no
// contacts, no inertia and no wheel slip; the point is to let the runtime
// and its tests run end to end without the real simulator.

use std::f64::consts::PI;

use tracing::{debug, info};

use super::{BodyId, EngineError, JointId, SimEngine, VehicleHandle};
use crate::config::RuntimeConfig;
use crate::messages::{Pose, VehicleVelocity};

/// Ground plane occupies body 0, the vehicle body 1 (same layout as the
/// Husky world: plane loaded first)
const PLANE_ID: BodyId = BodyId(0);
const VEHICLE_ID: BodyId = BodyId(1);

/// Husky wheel joint indices
const FRONT_LEFT: u32 = 2;
const FRONT_RIGHT: u32 = 3;
const REAR_LEFT: u32 = 4;
const REAR_RIGHT: u32 = 5;

const LEFT_JOINTS: [u32; 2] = [FRONT_LEFT, REAR_LEFT];
const RIGHT_JOINTS: [u32; 2] = [FRONT_RIGHT, REAR_RIGHT];

struct Body {
    label: String,
    pose: Pose,
    velocity: VehicleVelocity,
}

pub struct KinematicSim {
    bodies: Vec<Body>,
    // Effective target velocity per wheel joint, indexed by joint - FRONT_LEFT
    wheel_targets: [f64; 4],
    wheel_radius: f64,
    wheel_base: f64,
    dt: f64,
    steps: u64,
    connected: bool,
}

impl KinematicSim {
    pub fn new(config: &RuntimeConfig) -> Self {
        info!(
            "Kinematic sim: '{}' spawned at {:?}, step {:.5}s",
            config.vehicle_label,
            config.spawn_pose,
            config.dt()
        );
        Self {
            bodies: vec![
                Body {
                    label: "plane".to_string(),
                    pose: Pose::default(),
                    velocity: VehicleVelocity::zero(),
                },
                Body {
                    label: config.vehicle_label.clone(),
                    pose: config.spawn_pose,
                    velocity: VehicleVelocity::zero(),
                },
            ],
            wheel_targets: [0.0; 4],
            wheel_radius: config.wheel_radius,
            wheel_base: config.wheel_base,
            dt: config.dt(),
            steps: 0,
            connected: true,
        }
    }

    /// Handles of the vehicle body and its wheel joints
    pub fn vehicle(&self) -> VehicleHandle {
        let joint = |index| JointId {
            body: VEHICLE_ID,
            index,
        };
        VehicleHandle {
            body: VEHICLE_ID,
            left_wheels: LEFT_JOINTS.map(joint).to_vec(),
            right_wheels: RIGHT_JOINTS.map(joint).to_vec(),
        }
    }

    /// Number of steps taken since construction
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn ensure_connected(&self) -> Result<(), EngineError> {
        if self.connected {
            Ok(())
        } else {
            Err(EngineError::Disconnected)
        }
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut Body, EngineError> {
        self.bodies
            .get_mut(id.0 as usize)
            .ok_or(EngineError::UnknownBody(id))
    }

    /// Body-frame velocity implied by the current wheel targets
    fn wheel_body_velocity(&self) -> VehicleVelocity {
        let side = |joints: [u32; 2]| {
            joints
                .iter()
                .map(|j| self.wheel_targets[(j - FRONT_LEFT) as usize])
                .sum::<f64>()
                / joints.len() as f64
        };
        let wl = side(LEFT_JOINTS);
        let wr = side(RIGHT_JOINTS);
        VehicleVelocity {
            vx: self.wheel_radius * (wl + wr) / 2.0,
            wz: self.wheel_radius * (wr - wl) / self.wheel_base,
        }
    }
}

impl SimEngine for KinematicSim {
    fn set_motor_velocity(
        &mut self,
        joint: JointId,
        target_velocity: f64,
        max_force: f64,
    ) -> Result<(), EngineError> {
        self.ensure_connected()?;
        if joint.body != VEHICLE_ID || !(FRONT_LEFT..=REAR_RIGHT).contains(&joint.index) {
            return Err(EngineError::UnknownJoint {
                body: joint.body,
                index: joint.index,
            });
        }
        // A motor with no force budget does not drive its wheel
        let effective = if max_force > 0.0 { target_velocity } else { 0.0 };
        self.wheel_targets[(joint.index - FRONT_LEFT) as usize] = effective;
        Ok(())
    }

    fn step_once(&mut self) -> Result<(), EngineError> {
        self.ensure_connected()?;
        let velocity = self.wheel_body_velocity();
        let dt = self.dt;
        let vehicle = self.body_mut(VEHICLE_ID)?;

        let yaw = vehicle.pose.yaw;
        vehicle.pose.x += velocity.vx * yaw.cos() * dt;
        vehicle.pose.y += velocity.vx * yaw.sin() * dt;
        vehicle.pose.yaw = wrap_angle(yaw + velocity.wz * dt);
        vehicle.velocity = velocity;

        self.steps += 1;
        Ok(())
    }

    fn get_pose(&mut self, body: BodyId) -> Result<Pose, EngineError> {
        self.ensure_connected()?;
        Ok(self.body_mut(body)?.pose)
    }

    fn reset_body(
        &mut self,
        body: BodyId,
        pose: Pose,
        velocity: VehicleVelocity,
    ) -> Result<(), EngineError> {
        self.ensure_connected()?;
        if body == PLANE_ID {
            return Err(EngineError::Call("ground plane is static".to_string()));
        }
        let target = self.body_mut(body)?;
        target.pose = pose;
        target.velocity = velocity;
        self.wheel_targets = [0.0; 4];
        debug!("Body {:?} reset to {:?}", body, pose);
        Ok(())
    }

    fn find_body_by_label(&mut self, label: &str) -> Result<Option<BodyId>, EngineError> {
        self.ensure_connected()?;
        let needle = label.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        // The ground plane is static and never a lookup result
        Ok(self
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (BodyId(i as u32), b))
            .find(|(id, b)| *id != PLANE_ID && b.label.to_lowercase().contains(&needle))
            .map(|(id, _)| id))
    }

    fn disconnect(&mut self) {
        if self.connected {
            info!("Kinematic sim disconnected after {} steps", self.steps);
            self.connected = false;
        }
    }
}

/// Wrap an angle to (-pi, pi]
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}
