// HTTP API behaviour through the router, without binding a socket

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use husky_teleop_runtime::api::{self, AppState};
use husky_teleop_runtime::clock::{Clock, ManualClock, MonotonicClock};
use husky_teleop_runtime::config::{MAX_VX, MAX_WZ, RuntimeConfig};
use husky_teleop_runtime::control::CommandStore;
use husky_teleop_runtime::messages::{Pose, VehicleVelocity};
use husky_teleop_runtime::runtime::{self, ControlLoop, ShutdownSignal};
use husky_teleop_runtime::sim::KinematicSim;
use husky_teleop_runtime::telemetry::Telemetry;

struct Harness {
    clock: ManualClock,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new();
        let commands = Arc::new(CommandStore::new(Arc::new(clock.clone())));
        let telemetry = Arc::new(Telemetry::new(Pose::new(1.0, -2.0, 0.5), Arc::clone(&commands)));
        let mut state = AppState::new(commands, telemetry);
        // No loop is running here, keep /reset from waiting long
        state.reset_wait = Duration::from_millis(20);
        Self { clock, state }
    }

    fn app(&self) -> Router {
        api::router(self.state.clone())
    }

    fn effective(&self) -> VehicleVelocity {
        self.state.commands.effective(self.clock.now())
    }
}

async fn call(app: Router, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: Router, path: &str, body: &str) -> Value {
    let (status, value) = call(app, Method::POST, path, body).await;
    assert_eq!(status, StatusCode::OK, "POST {} failed", path);
    value
}

#[tokio::test]
async fn health_reports_ok() {
    let h = Harness::new();
    let (status, body) = call(h.app(), Method::GET, "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn pose_returns_published_snapshot() {
    let h = Harness::new();
    let (status, body) = call(h.app(), Method::GET, "/pose", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"x": 1.0, "y": -2.0, "yaw": 0.5}));
}

#[tokio::test]
async fn drive_stores_intent_and_reports_clamped_values() {
    let h = Harness::new();
    let body = post(h.app(), "/drive", r#"{"vx": 3.0, "wz": -9.0, "duration": 2}"#).await;
    assert_eq!(
        body,
        json!({"accepted": true, "vx_cmd": MAX_VX, "wz_cmd": -MAX_WZ, "duration": 2.0})
    );

    // The raw intent is stored, clamping happens in the loop
    assert_eq!(h.effective(), VehicleVelocity::new(3.0, -9.0));
    h.clock.set(Duration::from_secs_f64(2.5));
    assert_eq!(h.effective(), VehicleVelocity::zero());
}

#[tokio::test]
async fn drive_without_duration_never_expires() {
    let h = Harness::new();
    let body = post(h.app(), "/drive", r#"{"vx": 0.5}"#).await;
    assert_eq!(body["duration"], Value::Null);
    assert_eq!(body["wz_cmd"], json!(0.0));

    h.clock.set(Duration::from_secs(3600));
    assert_eq!(h.effective(), VehicleVelocity::new(0.5, 0.0));
}

#[tokio::test]
async fn drive_with_non_positive_duration_never_expires() {
    let h = Harness::new();
    post(h.app(), "/drive", r#"{"vx": 0.2, "wz": 0.1, "duration": -1}"#).await;
    h.clock.set(Duration::from_secs(60));
    assert_eq!(h.effective(), VehicleVelocity::new(0.2, 0.1));
}

#[tokio::test]
async fn malformed_bodies_fall_back_to_defaults() {
    let h = Harness::new();
    h.state.commands.set(1.0, 1.0, None);

    let body = post(h.app(), "/drive", "this is not json").await;
    assert_eq!(body["accepted"], json!(true));
    assert_eq!(h.effective(), VehicleVelocity::zero());

    let body = post(h.app(), "/drive", r#"{"vx": "0.4", "wz": "left"}"#).await;
    assert_eq!(body["vx_cmd"], json!(0.4));
    assert_eq!(body["wz_cmd"], json!(0.0));
}

#[tokio::test]
async fn forward_and_backward_use_defaults_and_sign() {
    let h = Harness::new();

    let body = post(h.app(), "/forward", "").await;
    assert_eq!(body["vx_cmd"], json!(api::DEFAULT_SPEED));
    assert_eq!(body["duration"], json!(api::DEFAULT_MOVE_DURATION));
    assert_eq!(h.effective(), VehicleVelocity::new(api::DEFAULT_SPEED, 0.0));

    let body = post(h.app(), "/backward", r#"{"speed": 0.9, "duration": 0.5}"#).await;
    assert_eq!(body["vx_cmd"], json!(-0.9));
    assert_eq!(h.effective(), VehicleVelocity::new(-0.9, 0.0));

    h.clock.set(Duration::from_secs_f64(0.6));
    assert_eq!(h.effective(), VehicleVelocity::zero());
}

#[tokio::test]
async fn turns_use_defaults_and_sign() {
    let h = Harness::new();

    let body = post(h.app(), "/turn_left", "{}").await;
    assert_eq!(body["wz_cmd"], json!(api::DEFAULT_TURN_RATE));
    assert_eq!(body["duration"], json!(api::DEFAULT_TURN_DURATION));

    let body = post(h.app(), "/turn_right", r#"{"rate": 5.0}"#).await;
    assert_eq!(body["vx_cmd"], json!(0.0));
    assert_eq!(body["wz_cmd"], json!(-MAX_WZ));
    assert_eq!(h.effective(), VehicleVelocity::new(0.0, -5.0));
}

#[tokio::test]
async fn stop_clears_command_and_is_idempotent() {
    let h = Harness::new();
    post(h.app(), "/drive", r#"{"vx": 1.0, "wz": 0.3}"#).await;

    for _ in 0..2 {
        let body = post(h.app(), "/stop", "").await;
        assert_eq!(body, json!({"stopped": true}));
        assert_eq!(h.effective(), VehicleVelocity::zero());
        assert_eq!(h.state.commands.intent().expires_at, None);
    }
}

#[tokio::test]
async fn reset_answers_even_without_a_running_loop() {
    let h = Harness::new();
    post(h.app(), "/drive", r#"{"vx": 1.0}"#).await;

    let body = post(h.app(), "/reset", "").await;
    assert_eq!(body, json!({"reset": true}));
    assert_eq!(h.effective(), VehicleVelocity::zero());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let h = Harness::new();
    let request = Request::builder()
        .uri("/teleport")
        .body(Body::empty())
        .unwrap();
    let response = h.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_with_running_loop_returns_vehicle_to_spawn() {
    let spawn = Pose::new(2.0, 3.0, 0.0);
    let config = RuntimeConfig {
        spawn_pose: spawn,
        ..RuntimeConfig::default()
    };

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let commands = Arc::new(CommandStore::new(Arc::clone(&clock)));
    let telemetry = Arc::new(Telemetry::new(spawn, Arc::clone(&commands)));
    let engine = KinematicSim::new(&config);
    let vehicle = engine.vehicle();
    let control = ControlLoop::new(
        engine,
        vehicle,
        Arc::clone(&commands),
        Arc::clone(&telemetry),
        clock,
        config,
    );
    let shutdown = ShutdownSignal::new();
    let handle = runtime::spawn(control, shutdown.clone()).unwrap();

    let app = api::router(AppState::new(Arc::clone(&commands), Arc::clone(&telemetry)));
    post(app.clone(), "/drive", r#"{"vx": 1.0, "wz": 0.5}"#).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ne!(telemetry.snapshot(), spawn);

    let body = post(app.clone(), "/reset", "").await;
    assert_eq!(body, json!({"reset": true}));
    // The reply waits for the loop, so the spawn pose is already published
    assert_eq!(telemetry.snapshot(), spawn);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(telemetry.snapshot(), spawn);

    shutdown.trigger();
    let stats = tokio::task::spawn_blocking(move || handle.join().unwrap())
        .await
        .unwrap();
    assert_eq!(stats.resets, 1);
}
