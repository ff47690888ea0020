pub mod api;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod control;
pub mod messages;
pub mod runtime;
pub mod sim;
pub mod telemetry;
pub mod zenoh_link;
