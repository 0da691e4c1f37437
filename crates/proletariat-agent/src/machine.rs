//! Sans-IO agent state machine.
//!
//! [`AgentCore`] owns every piece of mutable agent state and reacts to one
//! event at a time: link up, link down, inbound text, a completion, a timer.
//! Each transition returns the [`Effect`]s the caller must perform (send a
//! command, schedule a retry, hand a job to the executor). Nothing here does
//! I/O or touches a clock, so the protocol can be exercised synchronously.

use metrics::{counter, gauge};
use proletariat_core::constants::{
    COMPACTIONS_TOTAL, JOBS_ACCEPTED_TOTAL, JOBS_COMPLETED_TOTAL, JOBS_REJECTED_TOTAL,
    RESULTS_FLUSHED_TOTAL, SLOTS_AVAILABLE,
};
use proletariat_core::ids::{AgentId, JobId};
use proletariat_core::protocol::{
    self, AnswerEnvelope, Command, JobOutcome, JobResult, Outbound, PushAnswer,
};
use proletariat_settings::AgentSettings;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::batcher::ResultBatcher;
use crate::capacity::{SlotCounter, admit};
use crate::correlator::{Correlator, Route};
use crate::errors::{AgentError, Result};
use crate::ledger::{Ticket, WorkItem, WorkLedger};
use crate::state::{AgentSnapshot, AgentStatus};

const ACCEPTED_DESCRIPTION: &str = "i'll do my best";
const REJECTED_DESCRIPTION: &str = "some works were rejected";

/// Side effect requested by a state transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Write a command to the manager.
    Send(Outbound),
    /// Re-send `offer` after the offer retry delay, if `epoch` is still current.
    ScheduleOfferRetry {
        /// Connection the retry belongs to.
        epoch: u64,
    },
    /// Hand a job to the executor.
    Dispatch {
        /// The accepted job.
        item: WorkItem,
        /// Connection that accepted it.
        epoch: u64,
        /// Ledger ticket the completion must present.
        ticket: Ticket,
    },
    /// Handshake acknowledged.
    Ready(AgentId),
}

/// All mutable agent state.
#[derive(Debug)]
pub struct AgentCore {
    id: AgentId,
    status: AgentStatus,
    epoch: u64,
    slots: SlotCounter,
    ledger: WorkLedger,
    batcher: ResultBatcher,
    correlator: Correlator,
    finish_count: u64,
    can_cleanup: bool,
    cleanup_requests: u64,
}

impl AgentCore {
    /// Fresh offline agent sized by `settings`.
    pub fn new(id: AgentId, settings: &AgentSettings) -> Self {
        let core = Self {
            id,
            status: AgentStatus::Offline,
            epoch: 0,
            slots: SlotCounter::new(settings.slots.max),
            ledger: WorkLedger::new(),
            batcher: ResultBatcher::new(settings.answer_threshold()),
            correlator: Correlator::new(),
            finish_count: 0,
            can_cleanup: false,
            cleanup_requests: settings.timing.cleanup_requests.max(1),
        };
        core.publish_slots();
        core
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// Current connection generation.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Free slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available()
    }

    /// Point-in-time copy of the state.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            status: self.status,
            epoch: self.epoch,
            max_slots: self.slots.max(),
            available_slots: self.slots.available(),
            live_jobs: self.ledger.live_count(),
            tombstones: self.ledger.tombstone_count(),
            pending_results: self.batcher.len(),
            finish_count: self.finish_count,
            is_clean: self.ledger.is_clean(),
            can_cleanup: self.can_cleanup,
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// The link to the manager is up: go online and offer our slots.
    pub fn connected(&mut self) -> Vec<Effect> {
        if self.status == AgentStatus::Stopped {
            return Vec::new();
        }
        self.status = AgentStatus::Online;
        self.epoch += 1;
        info!(agent_id = %self.id, epoch = self.epoch, "connected to manager");

        let mut effects = Vec::new();
        self.send(
            Outbound::Offer {
                slots: self.slots.available(),
            },
            &mut effects,
        );
        effects
    }

    /// The link went down. Abandons all in-flight work.
    ///
    /// Returns `false` if the agent was not connected.
    pub fn disconnected(&mut self) -> bool {
        if !self.status.is_connected() {
            return false;
        }
        info!(
            agent_id = %self.id,
            epoch = self.epoch,
            abandoned = self.ledger.live_count(),
            "disconnected from manager"
        );
        self.status = AgentStatus::Offline;
        self.reset_work();
        true
    }

    /// Enter the terminal stopped state.
    pub fn stop(&mut self) {
        if self.status == AgentStatus::Stopped {
            return;
        }
        self.status = AgentStatus::Stopped;
        self.reset_work();
    }

    fn reset_work(&mut self) {
        self.ledger.reset();
        self.slots.reset();
        self.batcher.clear();
        self.correlator.clear();
        self.finish_count = 0;
        self.can_cleanup = false;
        self.publish_slots();
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Handle one inbound frame.
    pub fn on_message(&mut self, text: &str) -> Result<Vec<Effect>> {
        let inbound = match protocol::decode(text) {
            Ok(inbound) => inbound,
            Err(error) => {
                warn!(agent_id = %self.id, %error, "dropping malformed message");
                return Ok(Vec::new());
            }
        };

        match self.correlator.route(inbound) {
            Route::Handshake(answer) => Ok(self.on_offer_answer(answer)),
            Route::Informational { to, description } => {
                info!(
                    agent_id = %self.id,
                    to = %to,
                    description = description.as_deref().unwrap_or(""),
                    "manager answered"
                );
                Ok(Vec::new())
            }
            Route::Push(work) => self.receive_work(&work),
            Route::Unexpected { to, outstanding } => {
                warn!(
                    agent_id = %self.id,
                    to = to.as_deref().unwrap_or("<none>"),
                    outstanding = outstanding.map_or("<none>", Command::as_str),
                    "unexpected answer, dropping"
                );
                Ok(Vec::new())
            }
            Route::Ignored { command } => {
                debug!(
                    agent_id = %self.id,
                    command = command.as_deref().unwrap_or("<none>"),
                    "ignoring message"
                );
                Ok(Vec::new())
            }
        }
    }

    fn on_offer_answer(&mut self, answer: AnswerEnvelope) -> Vec<Effect> {
        if answer.is_error() {
            warn!(
                agent_id = %self.id,
                error = ?answer.error,
                "manager refused offer, retrying"
            );
            return vec![Effect::ScheduleOfferRetry { epoch: self.epoch }];
        }

        if let Some(id) = answer.you.as_ref().and_then(AgentId::from_manager) {
            debug!(old = %self.id, new = %id, "adopting manager-assigned id");
            self.id = id;
        }
        self.status = AgentStatus::Working;
        info!(agent_id = %self.id, slots = self.slots.available(), "handshake complete");
        vec![Effect::Ready(self.id.clone())]
    }

    /// Re-send `offer` for a handshake the manager refused.
    pub fn offer_retry(&mut self, epoch: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if epoch != self.epoch || self.status != AgentStatus::Online {
            debug!(epoch, current = self.epoch, status = %self.status, "offer retry obsolete");
            return effects;
        }
        self.send(
            Outbound::Offer {
                slots: self.slots.available(),
            },
            &mut effects,
        );
        effects
    }

    /// Admit a pushed `work` payload.
    pub fn receive_work(&mut self, work: &Value) -> Result<Vec<Effect>> {
        let mut effects = Vec::new();
        if !self.status.is_connected() {
            debug!(status = %self.status, "not connected, ignoring work");
            return Ok(effects);
        }
        let Some(batch) = work.as_array() else {
            warn!(agent_id = %self.id, "push without a work array");
            self.send(Outbound::Answer(PushAnswer::invalid_work()), &mut effects);
            return Ok(effects);
        };

        let was = self.slots.available();
        let admission = admit(batch, was, |id| self.ledger.is_live(id));
        let mut answer = PushAnswer {
            to: Some(Command::Push),
            ..PushAnswer::default()
        };

        let mut tickets = Vec::with_capacity(admission.accepted.len());
        if !admission.accepted.is_empty() {
            self.slots.reserve(admission.accepted.len())?;
            for item in &admission.accepted {
                let Some(ticket) = self.ledger.insert(item.clone()) else {
                    return Err(AgentError::SlotAccounting(format!(
                        "job {} accepted while live",
                        item.id
                    )));
                };
                tickets.push(ticket);
            }
            answer.accepted = Some(admission.accepted.iter().map(|i| i.id.clone()).collect());
            answer.description = Some(ACCEPTED_DESCRIPTION.to_string());
        }
        if !admission.rejected.is_empty() {
            answer.rejected = Some(admission.rejected.clone());
            answer.description = Some(REJECTED_DESCRIPTION.to_string());
            answer.allocation = Some(admission.allocation(was));
        }

        debug!(
            agent_id = %self.id,
            got = admission.got,
            accepted = admission.accepted.len(),
            rejected = admission.rejected.len(),
            skipped = admission.skipped,
            slots = self.slots.available(),
            "work received"
        );
        counter!(JOBS_ACCEPTED_TOTAL).increment(admission.accepted.len() as u64);
        counter!(JOBS_REJECTED_TOTAL).increment(admission.rejected.len() as u64);
        self.publish_slots();

        self.send(Outbound::Answer(answer), &mut effects);
        let epoch = self.epoch;
        effects.extend(
            admission
                .accepted
                .into_iter()
                .zip(tickets)
                .map(|(item, ticket)| Effect::Dispatch { item, epoch, ticket }),
        );
        Ok(effects)
    }

    // ── Completion ──────────────────────────────────────────────────

    /// Record a job's outcome.
    ///
    /// Returns `Ok(None)` when the completion is a no-op: stale epoch, agent
    /// not connected, unknown or already completed id, or an id that was
    /// reused under a newer ticket.
    pub fn complete(
        &mut self,
        id: &JobId,
        ticket: Ticket,
        epoch: u64,
        outcome: JobOutcome,
    ) -> Result<Option<Vec<Effect>>> {
        if epoch != self.epoch {
            debug!(job_id = %id, epoch, current = self.epoch, "stale completion ignored");
            return Ok(None);
        }
        if !self.status.is_connected() {
            debug!(job_id = %id, status = %self.status, "not connected, dropping result");
            return Ok(None);
        }
        if !self.ledger.complete(id, ticket, outcome.clone()) {
            debug!(job_id = %id, ?ticket, "duplicate or unknown completion ignored");
            return Ok(None);
        }

        self.slots.release()?;
        self.publish_slots();
        counter!(JOBS_COMPLETED_TOTAL).increment(1);
        self.batcher.push(JobResult {
            id: id.clone(),
            result: outcome,
        });

        let mut effects = Vec::new();
        if self.batcher.should_flush(self.slots.is_idle()) {
            let work = self.batcher.take();
            debug!(agent_id = %self.id, results = work.len(), "flushing results");
            counter!(RESULTS_FLUSHED_TOTAL).increment(1);
            self.send(Outbound::Done { work }, &mut effects);
        }

        self.finish_count += 1;
        if self.finish_count >= self.cleanup_requests {
            self.compact("periodic");
            self.finish_count = 0;
        } else if self.slots.is_idle() {
            self.can_cleanup = true;
        }
        Ok(Some(effects))
    }

    // ── Cleanup ─────────────────────────────────────────────────────

    /// Periodic check: verify slot accounting, then compact if idle and dirty.
    ///
    /// Returns whether a compaction ran. An error means the accounting is
    /// corrupt and the agent must stop.
    pub fn cleanup_tick(&mut self) -> Result<bool> {
        self.slots.check(self.ledger.live_count())?;
        if self.can_cleanup && !self.ledger.is_clean() && self.slots.is_idle() {
            self.compact("idle");
            return Ok(true);
        }
        Ok(false)
    }

    fn compact(&mut self, trigger: &'static str) {
        let removed = self.ledger.compact();
        self.can_cleanup = false;
        counter!(COMPACTIONS_TOTAL, "trigger" => trigger).increment(1);
        debug!(agent_id = %self.id, removed, trigger, "ledger compacted");
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn send(&mut self, command: Outbound, effects: &mut Vec<Effect>) {
        if !self.status.is_connected() {
            debug!(command = %command.command(), status = %self.status, "not connected, dropping command");
            return;
        }
        self.correlator.record(command.command());
        effects.push(Effect::Send(command));
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_slots(&self) {
        gauge!(SLOTS_AVAILABLE).set(self.slots.available() as f64);
    }

    #[cfg(test)]
    fn force_available(&mut self, available: usize) {
        self.slots = SlotCounter::new(self.slots.max());
        let taken = self.slots.max().saturating_sub(available);
        self.slots.reserve(taken).unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
