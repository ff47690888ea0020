// HTTP API: thin routing layer over the command store and telemetry
//
// Bodies are parsed leniently. An unparseable body counts as `{}`, and a
// field that is missing or not a number falls back to its default.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;

use crate::bridge::{MotionApi, MotionCommand};
use crate::config::RESET_WAIT;
use crate::control::{CommandStore, RampLimits};
use crate::messages::{DriveReply, Pose, VehicleVelocity};
use crate::telemetry::Telemetry;

// Convenience endpoint defaults
pub const DEFAULT_SPEED: f64 = 0.6; // m/s
pub const DEFAULT_MOVE_DURATION: f64 = 1.0; // s
pub const DEFAULT_TURN_RATE: f64 = 1.0; // rad/s
pub const DEFAULT_TURN_DURATION: f64 = 0.8; // s

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandStore>,
    pub telemetry: Arc<Telemetry>,
    pub limits: RampLimits,
    pub reset_wait: Duration,
}

impl AppState {
    pub fn new(commands: Arc<CommandStore>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            commands,
            telemetry,
            limits: RampLimits::default(),
            reset_wait: RESET_WAIT,
        }
    }

    /// Store a command and build the reply (reported velocities are clamped)
    pub fn command(&self, vx: f64, wz: f64, duration: Option<f64>) -> DriveReply {
        info!("Received command: vx={} wz={} duration={:?}", vx, wz, duration);
        self.commands.set(vx, wz, duration);
        let clamped = self.limits.clamp(VehicleVelocity::new(vx, wz));
        DriveReply {
            accepted: true,
            vx_cmd: clamped.vx,
            wz_cmd: clamped.wz,
            duration: duration.filter(|d| d.is_finite()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pose", get(pose))
        .route("/drive", post(drive))
        .route("/forward", post(forward))
        .route("/backward", post(backward))
        .route("/turn_left", post(turn_left))
        .route("/turn_right", post(turn_right))
        .route("/stop", post(stop))
        .route("/reset", post(reset))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn pose(State(state): State<AppState>) -> Json<Pose> {
    Json(state.telemetry.snapshot())
}

async fn drive(State(state): State<AppState>, body: Bytes) -> Json<DriveReply> {
    let body = parse_body(&body);
    let vx = velocity_field(&body, "vx", 0.0);
    let wz = velocity_field(&body, "wz", 0.0);
    let duration = number_field(&body, "duration");
    Json(state.command(vx, wz, duration))
}

async fn forward(State(state): State<AppState>, body: Bytes) -> Json<DriveReply> {
    let body = parse_body(&body);
    let speed = velocity_field(&body, "speed", DEFAULT_SPEED);
    let duration = number_field(&body, "duration").unwrap_or(DEFAULT_MOVE_DURATION);
    Json(state.command(speed, 0.0, Some(duration)))
}

async fn backward(State(state): State<AppState>, body: Bytes) -> Json<DriveReply> {
    let body = parse_body(&body);
    let speed = velocity_field(&body, "speed", DEFAULT_SPEED);
    let duration = number_field(&body, "duration").unwrap_or(DEFAULT_MOVE_DURATION);
    Json(state.command(-speed, 0.0, Some(duration)))
}

async fn turn_left(State(state): State<AppState>, body: Bytes) -> Json<DriveReply> {
    let body = parse_body(&body);
    let rate = velocity_field(&body, "rate", DEFAULT_TURN_RATE);
    let duration = number_field(&body, "duration").unwrap_or(DEFAULT_TURN_DURATION);
    Json(state.command(0.0, rate, Some(duration)))
}

async fn turn_right(State(state): State<AppState>, body: Bytes) -> Json<DriveReply> {
    let body = parse_body(&body);
    let rate = velocity_field(&body, "rate", DEFAULT_TURN_RATE);
    let duration = number_field(&body, "duration").unwrap_or(DEFAULT_TURN_DURATION);
    Json(state.command(0.0, -rate, Some(duration)))
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    info!("Stop requested");
    state.commands.stop();
    Json(json!({ "stopped": true }))
}

async fn reset(State(state): State<AppState>) -> Json<Value> {
    let ticket = state.telemetry.reset();
    // Answered either way; the command store is already clear
    state.telemetry.wait_applied(ticket, state.reset_wait).await;
    Json(json!({ "reset": true }))
}

/// Parse a request body, treating anything but a JSON object as empty
fn parse_body(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(Default::default()),
    }
}

/// Numeric field; numeric strings are accepted, anything else is `None`
fn number_field(body: &Value, key: &str) -> Option<f64> {
    match body.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Finite numeric field or `default`
fn velocity_field(body: &Value, key: &str, default: f64) -> f64 {
    number_field(body, key)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// The in-process core as a bridge target
impl MotionApi for AppState {
    type Error = Infallible;

    async fn execute(&self, command: MotionCommand) -> Result<Value, Self::Error> {
        let reply = match command {
            MotionCommand::Forward { speed, duration } => self.command(speed, 0.0, Some(duration)),
            MotionCommand::Backward { speed, duration } => self.command(-speed, 0.0, Some(duration)),
            MotionCommand::TurnLeft { rate, duration } => self.command(0.0, rate, Some(duration)),
            MotionCommand::TurnRight { rate, duration } => self.command(0.0, -rate, Some(duration)),
            MotionCommand::Stop => {
                self.commands.stop();
                return Ok(json!({ "stopped": true }));
            }
        };
        Ok(serde_json::to_value(reply).unwrap_or(Value::Null))
    }
}
