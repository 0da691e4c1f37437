//! Agent error types.

use proletariat_core::protocol::DecodeError;
use thiserror::Error;

/// Errors raised by the agent and its collaborators.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Dialing the manager failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// The established link failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// Line framing failed (oversized frame, invalid UTF-8).
    #[error("codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),
    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Slot accounting no longer matches the ledger.
    #[error("slot accounting corrupted: {0}")]
    SlotAccounting(String),
    /// The agent was stopped and cannot be restarted.
    #[error("agent is stopped")]
    Stopped,
    /// `start()` was called while the agent was already running.
    #[error("agent is already running")]
    AlreadyRunning,
}

impl AgentError {
    /// Whether this is a connect failure the supervisor retries by default.
    pub fn is_connection_refused(&self) -> bool {
        matches!(
            self,
            Self::Connect { source, .. } if source.kind() == std::io::ErrorKind::ConnectionRefused
        )
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
