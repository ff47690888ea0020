// Command-template bridge
//
// An external pattern matcher turns free-form text into events of the form
// `{template, command}`. This module maps each known template onto a
// `MotionCommand`, pulling the numeric arguments out of the command text
// left to right, and hands the result to a `MotionApi`.

mod client;

pub use client::{ClientError, RobotClient};

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::messages::Pose;

pub const TEMPLATE_FORWARD: &str = "move_forward_at_[number]_m/s_for_[number]_seconds";
pub const TEMPLATE_BACKWARD: &str = "move_backward_at_[number]_m/s_for_[number]_seconds";
pub const TEMPLATE_TURN_LEFT: &str = "turn_left_at_[number]_ras/s_for_[number]_seconds";
pub const TEMPLATE_TURN_RIGHT: &str = "turn_right_at_[number]_ras/s_for_[number]_seconds";
pub const TEMPLATE_STOP: &str = "stop";

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Event delivered by the pattern matcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateEvent {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

impl TemplateEvent {
    pub fn new(template: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            command: Some(command.into()),
        }
    }
}

/// Motion primitive requested through the bridge
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    Forward { speed: f64, duration: f64 },
    Backward { speed: f64, duration: f64 },
    TurnLeft { rate: f64, duration: f64 },
    TurnRight { rate: f64, duration: f64 },
    Stop,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BridgeError {
    #[error("Event did not match a known template")]
    MissingTemplate,

    #[error("No handler for template: {0}")]
    UnknownTemplate(String),

    #[error("Template {template} needs {expected} numeric arguments, found {found}")]
    NotEnoughArguments {
        template: String,
        expected: usize,
        found: usize,
    },
}

impl MotionCommand {
    /// Resolve an event against the dispatch table
    pub fn from_event(event: &TemplateEvent) -> Result<Self, BridgeError> {
        let template = event
            .template
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(BridgeError::MissingTemplate)?;

        let build: fn(f64, f64) -> MotionCommand = match template {
            TEMPLATE_FORWARD => |speed, duration| Self::Forward { speed, duration },
            TEMPLATE_BACKWARD => |speed, duration| Self::Backward { speed, duration },
            TEMPLATE_TURN_LEFT => |rate, duration| Self::TurnLeft { rate, duration },
            TEMPLATE_TURN_RIGHT => |rate, duration| Self::TurnRight { rate, duration },
            TEMPLATE_STOP => return Ok(Self::Stop),
            other => return Err(BridgeError::UnknownTemplate(other.to_string())),
        };

        let numbers = extract_numbers(event.command.as_deref().unwrap_or_default());
        match numbers.as_slice() {
            [first, second, ..] => Ok(build(*first, *second)),
            _ => Err(BridgeError::NotEnoughArguments {
                template: template.to_string(),
                expected: 2,
                found: numbers.len(),
            }),
        }
    }
}

/// All numeric literals in `command`, left to right
pub fn extract_numbers(command: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(command)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Something that can carry out motion commands
pub trait MotionApi {
    type Error: std::fmt::Display;

    fn execute(&self, command: MotionCommand) -> impl Future<Output = Result<Value, Self::Error>> + Send;
}

/// Acknowledgement returned for every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok(result: Value) -> Self {
        Self {
            ack: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn nack() -> Self {
        Self {
            ack: false,
            result: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ack: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Resolve and execute one event; never fails, failures become a negative ack
pub async fn handle_event<A: MotionApi>(api: &A, event: &TemplateEvent) -> Ack {
    let command = match MotionCommand::from_event(event) {
        Ok(command) => command,
        Err(e) => {
            warn!("[bridge] {}", e);
            return Ack::nack();
        }
    };

    match api.execute(command).await {
        Ok(result) => Ack::ok(result),
        Err(e) => {
            warn!("[bridge] Robot command {:?} failed: {}", command, e);
            Ack::failed(e.to_string())
        }
    }
}

/// Context line describing the latest pose, or why it could not be read
pub fn context_payload<E: std::fmt::Display>(pose: Result<Pose, E>) -> Value {
    match pose {
        Ok(pose) => json!({ "pose": pose }),
        Err(e) => json!({ "pose_error": e.to_string() }),
    }
}
