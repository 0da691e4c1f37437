//! Wire envelopes exchanged with the manager.
//!
//! Every message is one JSON object carrying a `command` field. The agent
//! sends three commands ([`Outbound`]): `offer`, `answer` (to a `push`) and
//! `done`. The manager sends answers to those and `push` batches; decoding
//! of inbound traffic is deliberately lenient ([`decode`]) because the
//! manager is a black box and malformed traffic must never take the agent
//! down.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::EINVWORK;
use crate::ids::JobId;

// ─────────────────────────────────────────────────────────────────────────────
// Command names
// ─────────────────────────────────────────────────────────────────────────────

/// Protocol command names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Handshake: advertise free slots.
    Offer,
    /// Reply to the peer's last command.
    Answer,
    /// Deliver finished results.
    Done,
    /// Manager pushes a batch of jobs.
    Push,
    /// Liveness probe.
    Ping,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Done => "done",
            Self::Push => "push",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A command the agent sends to the manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Outbound {
    /// Advertise free execution slots.
    Offer {
        /// Slots currently available.
        slots: usize,
    },
    /// Answer to a `push`.
    Answer(PushAnswer),
    /// Report finished jobs.
    Done {
        /// Results in completion order.
        work: Vec<JobResult>,
    },
}

impl Outbound {
    /// The command this envelope carries.
    pub fn command(&self) -> Command {
        match self {
            Self::Offer { .. } => Command::Offer,
            Self::Answer(_) => Command::Answer,
            Self::Done { .. } => Command::Done,
        }
    }
}

/// Body of the agent's answer to a `push`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PushAnswer {
    /// Always `push`.
    pub to: Option<Command>,
    /// Ids the agent took on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<Vec<JobId>>,
    /// Ids the agent turned down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Vec<JobId>>,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Slot accounting, present whenever something was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,
    /// Batch-level failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl PushAnswer {
    /// Answer rejecting a `work` payload that is not an array.
    pub fn invalid_work() -> Self {
        Self {
            to: Some(Command::Push),
            error: Some(ProtocolError {
                code: EINVWORK.to_string(),
                description: "Invalid work ?array?".to_string(),
            }),
            ..Self::default()
        }
    }
}

/// Slot accounting reported when a batch was partly rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Slots available before the batch.
    pub was: usize,
    /// Slots available after the batch.
    pub is: usize,
    /// Number of rejected descriptors.
    pub rejected: usize,
    /// Number of descriptors in the batch, malformed ones included.
    pub got: usize,
}

/// Protocol-level error body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Machine-readable code, e.g. `EINVWORK`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

/// Outcome of one job, as reported in `done`.
///
/// Mirrors the executor callback's `(err, data)` pair: a successful job has
/// a null `err`, a failed one a null `data`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Failure description, null on success.
    #[serde(default)]
    pub err: Value,
    /// Job output, null on failure.
    #[serde(default)]
    pub data: Value,
}

impl JobOutcome {
    /// Successful outcome.
    pub fn success(data: Value) -> Self {
        Self {
            err: Value::Null,
            data,
        }
    }

    /// Failed outcome.
    pub fn failure(err: Value) -> Self {
        Self {
            err,
            data: Value::Null,
        }
    }

    /// Whether the job failed.
    pub fn is_error(&self) -> bool {
        !self.err.is_null()
    }
}

impl From<Result<Value, Value>> for JobOutcome {
    fn from(result: Result<Value, Value>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(err),
        }
    }
}

/// One entry of a `done` batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job the result belongs to.
    pub id: JobId,
    /// The job's outcome.
    pub result: JobOutcome,
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is JSON but not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,
}

/// A decoded message from the manager.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Answer to one of the agent's commands.
    Answer(AnswerEnvelope),
    /// A batch of jobs. `work` is kept raw; its shape is validated by intake.
    Push {
        /// The pushed `work` value.
        work: Value,
    },
    /// Any other command (or none at all).
    Unknown {
        /// The command name, when it was a string.
        command: Option<String>,
    },
}

/// Fields of an `answer` envelope the agent cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnswerEnvelope {
    /// Command being answered.
    pub to: Option<String>,
    /// Error reported by the manager, if any.
    pub error: Option<Value>,
    /// Id the manager assigns to this agent.
    pub you: Option<Value>,
    /// Free-form description.
    pub description: Option<String>,
}

impl AnswerEnvelope {
    /// Whether the answer reports a failure.
    ///
    /// Any "truthy" `error` counts: `false`, `0`, `""` and null do not.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(is_truthy)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

/// Decode one frame received from the manager.
pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let command = map.get("command").and_then(Value::as_str);
    let inbound = match command {
        Some("answer") => Inbound::Answer(AnswerEnvelope {
            to: map.get("to").and_then(Value::as_str).map(str::to_owned),
            error: non_null(map.get("error")),
            you: non_null(map.get("you")),
            description: map.get("description").and_then(|d| match d {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }),
        }),
        Some("push") => Inbound::Push {
            work: map.get("work").cloned().unwrap_or(Value::Null),
        },
        other => Inbound::Unknown {
            command: other.map(str::to_owned),
        },
    };
    Ok(inbound)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
