// HTTP client for the runtime's network API
//
// Mirrors the endpoint table one method per route. Convenience motions go
// through /drive so the duration normalisation below applies to all of them.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{MotionApi, MotionCommand};
use crate::messages::Pose;

/// Error types for talking to the runtime over HTTP
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected response type: {0}")]
    UnexpectedBody(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct RobotClient {
    http: Client,
    base_url: String,
}

impl RobotClient {
    /// Create a client for the API at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn request(&self, method: Method, path: &str, payload: Option<Value>) -> Result<Value> {
        let url = self.url(path);
        debug!("{} {} {:?}", method, url, payload);

        let mut request = self.http.request(method, url);
        if let Some(payload) = payload {
            request = request.json(&payload);
        }
        let response = request.send().await?.error_for_status()?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            value @ Value::Object(_) => Ok(value),
            other => Err(ClientError::UnexpectedBody(other.to_string())),
        }
    }

    /// Ping the health endpoint
    pub async fn health(&self) -> Result<Value> {
        self.request(Method::GET, "/health", None).await
    }

    /// Most recently observed pose
    pub async fn pose(&self) -> Result<Pose> {
        let value = self.request(Method::GET, "/pose", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Drive with differential velocity commands
    pub async fn drive(&self, vx: f64, wz: f64, duration: Option<f64>) -> Result<Value> {
        let mut payload = json!({ "vx": vx, "wz": wz });
        if let Some(duration) = normalise_duration(duration) {
            payload["duration"] = json!(duration);
        }
        self.request(Method::POST, "/drive", Some(payload)).await
    }

    pub async fn forward(&self, speed: f64, duration: f64) -> Result<Value> {
        self.drive(speed, 0.0, Some(duration)).await
    }

    pub async fn backward(&self, speed: f64, duration: f64) -> Result<Value> {
        self.drive(-speed, 0.0, Some(duration)).await
    }

    /// Rotate counter-clockwise
    pub async fn turn_left(&self, rate: f64, duration: f64) -> Result<Value> {
        self.drive(0.0, rate, Some(duration)).await
    }

    /// Rotate clockwise
    pub async fn turn_right(&self, rate: f64, duration: f64) -> Result<Value> {
        self.drive(0.0, -rate, Some(duration)).await
    }

    pub async fn stop(&self) -> Result<Value> {
        self.request(Method::POST, "/stop", None).await
    }

    /// Send the vehicle back to its spawn pose
    pub async fn reset(&self) -> Result<Value> {
        self.request(Method::POST, "/reset", None).await
    }
}

impl MotionApi for RobotClient {
    type Error = ClientError;

    async fn execute(&self, command: MotionCommand) -> Result<Value> {
        match command {
            MotionCommand::Forward { speed, duration } => self.forward(speed, duration).await,
            MotionCommand::Backward { speed, duration } => self.backward(speed, duration).await,
            MotionCommand::TurnLeft { rate, duration } => self.turn_left(rate, duration).await,
            MotionCommand::TurnRight { rate, duration } => self.turn_right(rate, duration).await,
            MotionCommand::Stop => self.stop().await,
        }
    }
}

/// Non-positive durations are sent as 0.0, which the server treats as no expiry
fn normalise_duration(duration: Option<f64>) -> Option<f64> {
    duration.map(|d| if d <= 0.0 { 0.0 } else { d })
}
