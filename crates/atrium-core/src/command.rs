//! Protocol commands and the request/response envelopes that carry them.
//!
//! A [`Request`] names a command and carries its arguments as a
//! [`WireValue`]. [`Command::parse`] turns the name and decoded arguments
//! into a typed command, rejecting malformed arguments before anything
//! reaches the engine. Every request is answered by exactly one
//! [`Response`].

use serde::{Deserialize, Serialize};

use atrium_wire::{Map, Value, Vector, WireValue};

use crate::engine::ActionRequest;
use crate::error::{ErrorKind, SessionError};

/// Largest `repeat` a single `action` request may ask for.
pub const MAX_REPEAT: u32 = 1000;

/// A parsed, shape-checked protocol command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the simulator handle.
    Init(Map),
    /// Build the configured scene and begin an episode.
    Start(Map),
    /// Begin a new episode in the loaded scene.
    Reset(Map),
    /// Merge options into the session configuration.
    Configure(Map),
    /// Advance the episode by one action request.
    Action(ActionRequest),
    /// Teleport the agent.
    MoveTo(Map),
    /// Replace the episode goal.
    SetGoal(Map),
    /// Current episode summary.
    GetSceneData,
    /// Sensor and output schema.
    GetObservationMetadata,
    /// Recorded step history.
    GetActionTrace,
    /// Reseed the engine.
    Seed(u64),
    /// Release the handle and end the session.
    Close,
}

impl Command {
    /// Every command name of the protocol.
    pub const NAMES: [&'static str; 12] = [
        "init",
        "start",
        "reset",
        "configure",
        "action",
        "move_to",
        "set_goal",
        "get_scene_data",
        "get_observation_metadata",
        "get_action_trace",
        "seed",
        "close",
    ];

    /// Parse a command from its name and decoded arguments.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownCommand`] for a name outside the protocol,
    /// [`SessionError::InvalidArgument`] when the arguments have the wrong
    /// shape.
    pub fn parse(name: &str, args: Value) -> Result<Self, SessionError> {
        let command = match name {
            "init" => Self::Init(optional_map(name, args)?),
            "start" => Self::Start(optional_map(name, args)?),
            "reset" => Self::Reset(optional_map(name, args)?),
            "configure" => Self::Configure(required_map(name, args)?),
            "action" => Self::Action(action_request(args)?),
            "move_to" => Self::MoveTo(pose(args)?),
            "set_goal" => {
                let goal = required_map(name, args)?;
                if goal.is_empty() {
                    return Err(invalid(name, "goal specification is empty"));
                }
                Self::SetGoal(goal)
            }
            "get_scene_data" => Self::GetSceneData,
            "get_observation_metadata" => Self::GetObservationMetadata,
            "get_action_trace" => Self::GetActionTrace,
            "seed" => Self::Seed(seed(args)?),
            "close" => Self::Close,
            other => return Err(SessionError::UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }

    /// The protocol name of this command.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Start(_) => "start",
            Self::Reset(_) => "reset",
            Self::Configure(_) => "configure",
            Self::Action(_) => "action",
            Self::MoveTo(_) => "move_to",
            Self::SetGoal(_) => "set_goal",
            Self::GetSceneData => "get_scene_data",
            Self::GetObservationMetadata => "get_observation_metadata",
            Self::GetActionTrace => "get_action_trace",
            Self::Seed(_) => "seed",
            Self::Close => "close",
        }
    }
}

fn invalid(command: &str, reason: &str) -> SessionError {
    SessionError::InvalidArgument {
        command: command.to_owned(),
        reason: reason.to_owned(),
    }
}

fn optional_map(command: &str, args: Value) -> Result<Map, SessionError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Map(map) => Ok(map),
        _ => Err(invalid(command, "expected a mapping or null")),
    }
}

fn required_map(command: &str, args: Value) -> Result<Map, SessionError> {
    match args {
        Value::Map(map) => Ok(map),
        _ => Err(invalid(command, "expected a mapping")),
    }
}

fn action_request(args: Value) -> Result<ActionRequest, SessionError> {
    let mut params = required_map("action", args)?;
    let name = match params.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(invalid("action", "`name` must be a non-empty string")),
    };
    let repeat = match params.remove("repeat") {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| (1..=MAX_REPEAT).contains(n))
            .ok_or_else(|| {
                invalid(
                    "action",
                    &format!("`repeat` must be an integer between 1 and {MAX_REPEAT}"),
                )
            })?,
    };
    Ok(ActionRequest {
        name,
        params,
        repeat,
    })
}

fn pose(args: Value) -> Result<Map, SessionError> {
    let pose = required_map("move_to", args)?;
    match pose.get("position").and_then(Value::as_vector) {
        Some(Vector::Vec3(_)) => Ok(pose),
        _ => Err(invalid("move_to", "`position` must be a 3-component vector")),
    }
}

fn seed(args: Value) -> Result<u64, SessionError> {
    let raw = match &args {
        Value::Map(m) => m.get("seed").cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    raw.as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| invalid("seed", "expected a non-negative integer"))
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// One command frame as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the response.
    #[serde(default)]
    pub id: Option<u64>,
    /// Command name.
    pub command: String,
    /// Command arguments.
    #[serde(default = "null_args")]
    pub args: WireValue,
}

const fn null_args() -> WireValue {
    WireValue::Null
}

impl Request {
    /// Build a request.
    pub fn new(id: u64, command: impl Into<String>, args: WireValue) -> Self {
        Self {
            id: Some(id),
            command: command.into(),
            args,
        }
    }

    /// Parse a request frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the best-effort correlation id together with the reason when
    /// the text is not a request frame.
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|e| FrameError {
            id: recover_id(text),
            reason: e.to_string(),
        })
    }

    /// Serialize to compact JSON text.
    ///
    /// # Errors
    ///
    /// Propagates [`serde_json::Error`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A text frame that is not a valid request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed request frame: {reason}")]
pub struct FrameError {
    /// The `id` field, if it could still be read.
    pub id: Option<u64>,
    /// Why the frame was rejected.
    pub reason: String,
}

impl FrameError {
    /// The `UnknownCommandError` response for this frame.
    pub fn to_response(&self) -> Response {
        Response {
            id: self.id,
            status: Status::Error,
            data: None,
            message: Some(self.to_string()),
            error: Some(ErrorKind::UnknownCommandError),
        }
    }
}

fn recover_id(text: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("id")?
        .as_u64()
}

/// Outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The command succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// The command failed; see `error` and `message`.
    #[serde(rename = "error")]
    Error,
}

/// The single reply to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request, `null` if it had none.
    pub id: Option<u64>,
    /// Success or failure.
    pub status: Status,
    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<WireValue>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error kind on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl Response {
    /// Successful response carrying `data`.
    pub const fn ok(id: Option<u64>, data: WireValue) -> Self {
        Self {
            id,
            status: Status::Ok,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// Failed response describing `err`.
    pub fn error(id: Option<u64>, err: &SessionError) -> Self {
        Self {
            id,
            status: Status::Error,
            data: None,
            message: Some(err.to_string()),
            error: Some(err.kind()),
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serialize to compact JSON text.
    ///
    /// # Errors
    ///
    /// Propagates [`serde_json::Error`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a response from JSON text.
    ///
    /// # Errors
    ///
    /// Propagates [`serde_json::Error`].
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
