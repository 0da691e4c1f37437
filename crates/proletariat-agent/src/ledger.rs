//! In-flight work tracking.
//!
//! A completed job is not removed right away: its entry becomes a tombstone
//! and is only dropped by [`WorkLedger::compact`]. That keeps a late or
//! duplicate completion from finding a vacant slot and being mistaken for a
//! new job.
//!
//! The manager may reuse an id once its job is done, so every accepted job
//! also gets a [`Ticket`]. A completion must present the ticket of the live
//! entry; an old handle for a reused id finds a different ticket and is
//! refused.

use std::collections::HashMap;

use proletariat_core::ids::JobId;
use proletariat_core::protocol::JobOutcome;
use serde_json::Value;

/// One accepted job.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
    /// Manager-assigned id.
    pub id: JobId,
    /// Declared handler kind, if any.
    pub kind: Option<String>,
    /// Opaque job payload.
    pub args: Value,
    /// Outcome, set exactly once on completion.
    pub result: Option<JobOutcome>,
}

impl WorkItem {
    /// A job that has not run yet.
    pub fn new(id: JobId, kind: Option<String>, args: Value) -> Self {
        Self {
            id,
            kind,
            args,
            result: None,
        }
    }
}

/// Identifies one acceptance of a job. Never reused within a ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Ledger slot for one job id.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerEntry {
    /// Accepted and running.
    Live {
        /// The job.
        item: WorkItem,
        /// Ticket its completion must present.
        ticket: Ticket,
    },
    /// Completed; kept until the next compaction.
    Tombstone(WorkItem),
}

/// Jobs keyed by id.
#[derive(Debug, Default)]
pub struct WorkLedger {
    entries: HashMap<JobId, LedgerEntry>,
    live: usize,
    next_ticket: u64,
}

impl WorkLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted job and hand out its ticket. Replaces a tombstone
    /// with the same id.
    ///
    /// Returns `None` (and leaves the ledger untouched) if the id is live.
    pub fn insert(&mut self, item: WorkItem) -> Option<Ticket> {
        if self.is_live(&item.id) {
            return None;
        }
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.live += 1;
        let _ = self
            .entries
            .insert(item.id.clone(), LedgerEntry::Live { item, ticket });
        Some(ticket)
    }

    /// Whether `id` is accepted and not yet completed.
    pub fn is_live(&self, id: &JobId) -> bool {
        matches!(self.entries.get(id), Some(LedgerEntry::Live { .. }))
    }

    /// Ticket of the live job `id`.
    pub fn ticket(&self, id: &JobId) -> Option<Ticket> {
        match self.entries.get(id) {
            Some(LedgerEntry::Live { ticket, .. }) => Some(*ticket),
            _ => None,
        }
    }

    /// Attach `outcome` to the live job `id` accepted under `ticket` and
    /// tombstone it.
    ///
    /// Returns `false` if the id is unknown, already completed, or live
    /// under a different ticket.
    pub fn complete(&mut self, id: &JobId, ticket: Ticket, outcome: JobOutcome) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        let LedgerEntry::Live { item, ticket: live } = entry else {
            return false;
        };
        if *live != ticket {
            return false;
        }
        let mut item = item.clone();
        item.result = Some(outcome);
        *entry = LedgerEntry::Tombstone(item);
        self.live -= 1;
        true
    }

    /// Drop every tombstone. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| matches!(entry, LedgerEntry::Live { .. }));
        before - self.entries.len()
    }

    /// Forget everything (connection lost). Tickets keep counting up.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.live = 0;
    }

    /// Number of live jobs.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of tombstones awaiting compaction.
    pub fn tombstone_count(&self) -> usize {
        self.entries.len() - self.live
    }

    /// Whether there is nothing to compact.
    pub fn is_clean(&self) -> bool {
        self.tombstone_count() == 0
    }

    /// Look up an entry.
    pub fn get(&self, id: &JobId) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }
}
