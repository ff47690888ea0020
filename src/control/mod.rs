// Control primitives for the Husky base
//
// Provides:
// - Differential-drive inverse kinematics (body velocity -> wheel speeds)
// - Velocity ramping with passive decay
// - The shared command store read by the control loop

mod command_store;
pub mod kinematics;
pub mod ramp;

pub use command_store::CommandStore;
pub use kinematics::{wheel_speeds, wheel_speeds_with_params};
pub use ramp::{ramp, ramp_with_limits, RampLimits};
