// Simulation engine boundary
//
// The physics engine is an external collaborator. The control loop only ever
// talks to it through `SimEngine`, and owns the engine outright, so no other
// thread can reach it.

pub mod kinematic;

pub use kinematic::KinematicSim;

use crate::messages::{Pose, VehicleVelocity};

/// Engine handle of a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub u32);

/// Engine handle of a joint on a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId {
    pub body: BodyId,
    pub index: u32,
}

/// Error types for engine communication
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine is not connected")]
    Disconnected,

    #[error("Unknown body {0:?}")]
    UnknownBody(BodyId),

    #[error("No body labelled '{0}'")]
    NoSuchLabel(String),

    #[error("Unknown joint {index} on body {body:?}")]
    UnknownJoint { body: BodyId, index: u32 },

    #[error("Engine call failed: {0}")]
    Call(String),
}

/// Primitives the control loop needs from a physics engine
pub trait SimEngine: Send {
    /// Velocity-control a joint, bounded by `max_force`
    fn set_motor_velocity(
        &mut self,
        joint: JointId,
        target_velocity: f64,
        max_force: f64,
    ) -> Result<(), EngineError>;

    /// Advance the world by one fixed step
    fn step_once(&mut self) -> Result<(), EngineError>;

    /// Planar pose of a body
    fn get_pose(&mut self, body: BodyId) -> Result<Pose, EngineError>;

    /// Teleport a body and set its base velocity
    fn reset_body(
        &mut self,
        body: BodyId,
        pose: Pose,
        velocity: VehicleVelocity,
    ) -> Result<(), EngineError>;

    /// Look up a body by (case-insensitive substring of) its label
    fn find_body_by_label(&mut self, label: &str) -> Result<Option<BodyId>, EngineError>;

    /// Tear down the engine connection
    fn disconnect(&mut self) {}
}

/// The driven vehicle as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleHandle {
    pub body: BodyId,
    pub left_wheels: Vec<JointId>,
    pub right_wheels: Vec<JointId>,
}
