//! Notifications from the agent to its owner, and the completion handle.

use std::sync::Weak;

use proletariat_core::ids::{AgentId, JobId};
use proletariat_core::protocol::JobOutcome;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::agent::Shared;
use crate::ledger::{Ticket, WorkItem};

/// Something the agent's owner should know about.
#[derive(Debug)]
pub enum AgentEvent {
    /// A job was accepted and must be executed.
    Work {
        /// The job.
        item: WorkItem,
        /// Handle to report the job's outcome through.
        completion: Completion,
    },
    /// The manager acknowledged the handshake.
    Ready {
        /// Id in effect after the handshake.
        agent_id: AgentId,
    },
    /// A non-fatal failure (connect error, read error).
    Error {
        /// Human-readable description.
        message: String,
    },
    /// The link to the manager closed; in-flight work was abandoned.
    Close,
    /// Slot accounting is corrupt. The agent has stopped itself.
    Fatal {
        /// Human-readable description.
        message: String,
    },
}

/// Receiving end of an agent's notifications.
#[derive(Debug)]
pub struct AgentEvents {
    rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl AgentEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification. `None` once the agent is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Next notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.rx.try_recv().ok()
    }
}

/// Reports the outcome of exactly one job.
///
/// Cheap to clone and safe to call from any thread. Only the first call for
/// a job counts. Later calls are no-ops, even if the manager has since reused
/// the job's id for a new job. So are calls after the connection that
/// accepted the job went away and calls after the agent was dropped.
#[derive(Clone, Debug)]
pub struct Completion {
    job_id: JobId,
    ticket: Ticket,
    epoch: u64,
    agent: Weak<Shared>,
}

impl Completion {
    pub(crate) fn new(job_id: JobId, ticket: Ticket, epoch: u64, agent: Weak<Shared>) -> Self {
        Self {
            job_id,
            ticket,
            epoch,
            agent,
        }
    }

    /// Job this handle belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Connection generation that accepted the job.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record `outcome`. Returns whether it was applied.
    pub fn complete(&self, outcome: JobOutcome) -> bool {
        let Some(shared) = self.agent.upgrade() else {
            debug!(job_id = %self.job_id, "agent dropped, discarding result");
            return false;
        };
        shared.complete(&self.job_id, self.ticket, self.epoch, outcome)
    }

    /// Record an executor-style `(err, data)` result.
    pub fn finish(&self, result: Result<Value, Value>) -> bool {
        self.complete(JobOutcome::from(result))
    }
}
