//! Agent lifecycle status and point-in-time snapshots.

use std::fmt;

use proletariat_core::ids::AgentId;
use serde::Serialize;

/// Connection-level status of the agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// No connection to the manager.
    #[default]
    Offline,
    /// Connected, handshake not yet acknowledged.
    Online,
    /// Handshake acknowledged; work may be pushed.
    Working,
    /// Stopped for good.
    Stopped,
}

impl AgentStatus {
    /// Whether outbound commands can be sent in this status.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Online | Self::Working)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Working => "working",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy of the agent's observable state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    /// Current agent id.
    pub id: AgentId,
    /// Current status.
    pub status: AgentStatus,
    /// Connection generation.
    pub epoch: u64,
    /// Configured slot count.
    pub max_slots: usize,
    /// Free slots.
    pub available_slots: usize,
    /// Jobs accepted and not yet completed.
    pub live_jobs: usize,
    /// Completed jobs awaiting compaction.
    pub tombstones: usize,
    /// Results waiting for the next `done`.
    pub pending_results: usize,
    /// Completions since the last periodic compaction.
    pub finish_count: u64,
    /// Whether the ledger holds no tombstones.
    pub is_clean: bool,
    /// Whether the cleanup scheduler may compact.
    pub can_cleanup: bool,
}
