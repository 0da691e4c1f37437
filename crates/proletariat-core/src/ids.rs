//! Identifier types.
//!
//! [`AgentId`] names this agent. It is generated locally by an injected
//! [`IdSource`] and may later be replaced by the id the manager assigns in
//! its `offer` answer. [`JobId`] is always chosen by the manager and is
//! echoed back verbatim, so it keeps the JSON type it arrived with.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// AgentId
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of this agent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Adopt the id the manager assigned in an `offer` answer (`you`).
    ///
    /// Strings are taken as-is and numbers are rendered in decimal. Any other
    /// JSON value is not a usable id.
    #[must_use]
    pub fn from_manager(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdSource
// ─────────────────────────────────────────────────────────────────────────────

/// Source of locally generated agent ids.
///
/// Scoped to whoever constructs agents (normally the process entry point),
/// so two sources never share a counter by accident.
pub trait IdSource: Send + Sync {
    /// Produce the next agent id.
    fn next_agent_id(&self) -> AgentId;
}

/// Monotonic counter starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Create a counter whose first id is `1`.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn next_agent_id(&self) -> AgentId {
        AgentId(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

/// Time-ordered UUID v7 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_agent_id(&self) -> AgentId {
        AgentId(Uuid::now_v7().to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobId
// ─────────────────────────────────────────────────────────────────────────────

/// Manager-assigned job identifier.
///
/// The manager may use integers or strings; the variant is preserved so the
/// id serializes back exactly as it was received.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    /// Integer id.
    Number(i64),
    /// String id.
    Text(String),
}

impl JobId {
    /// Read a job id from a descriptor's `id` field.
    ///
    /// Returns `None` for null, missing-equivalent, and non-integer values;
    /// such descriptors are treated as lacking an identifier.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for JobId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
