//! Slot accounting and admission of pushed batches.
//!
//! [`SlotCounter`] owns `available <= max` and refuses to underflow or
//! overflow instead of clamping. [`admit`] is pure: it decides what a batch
//! turns into given the free slots seen before the batch, and the caller
//! applies the decision.

use std::collections::HashSet;

use proletariat_core::ids::JobId;
use proletariat_core::protocol::Allocation;
use serde_json::Value;

use crate::errors::{AgentError, Result};
use crate::ledger::WorkItem;

// ─────────────────────────────────────────────────────────────────────────────
// SlotCounter
// ─────────────────────────────────────────────────────────────────────────────

/// Free execution slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotCounter {
    max: usize,
    available: usize,
}

impl SlotCounter {
    /// All `max` slots free.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            available: max,
        }
    }

    /// Configured slot count.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Whether every slot is free.
    pub fn is_idle(&self) -> bool {
        self.available == self.max
    }

    /// Take `n` slots.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        self.available = self.available.checked_sub(n).ok_or_else(|| {
            AgentError::SlotAccounting(format!(
                "reserving {n} slots with only {} available",
                self.available
            ))
        })?;
        Ok(())
    }

    /// Give one slot back.
    pub fn release(&mut self) -> Result<()> {
        if self.available >= self.max {
            return Err(AgentError::SlotAccounting(format!(
                "releasing a slot with all {} free",
                self.max
            )));
        }
        self.available += 1;
        Ok(())
    }

    /// Free every slot.
    pub fn reset(&mut self) {
        self.available = self.max;
    }

    /// Verify the counter against the number of live jobs.
    pub fn check(&self, live: usize) -> Result<()> {
        if self.available > self.max {
            return Err(AgentError::SlotAccounting(format!(
                "available {} > max {}",
                self.available, self.max
            )));
        }
        if self.available + live != self.max {
            return Err(AgentError::SlotAccounting(format!(
                "available {} + live {live} != max {}",
                self.available, self.max
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admission
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of admitting one pushed batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Admission {
    /// Jobs to run, in batch order.
    pub accepted: Vec<WorkItem>,
    /// Ids turned down, in batch order.
    pub rejected: Vec<JobId>,
    /// Descriptors without a usable id.
    pub skipped: usize,
    /// Batch length, skipped entries included.
    pub got: usize,
}

impl Admission {
    /// Slot accounting for the answer, given the free slots before the batch.
    pub fn allocation(&self, was: usize) -> Allocation {
        Allocation {
            was,
            is: was.saturating_sub(self.accepted.len()),
            rejected: self.rejected.len(),
            got: self.got,
        }
    }
}

/// Decide which descriptors of `batch` to run.
///
/// - no usable `id` (missing, null, not an integer or string): skipped
/// - `args` missing or null: rejected
/// - `ceiling` already reached: rejected
/// - id live in the ledger (`is_live`) or already accepted in this batch: rejected
/// - otherwise accepted
pub fn admit<F>(batch: &[Value], ceiling: usize, is_live: F) -> Admission
where
    F: Fn(&JobId) -> bool,
{
    let mut admission = Admission {
        got: batch.len(),
        ..Admission::default()
    };
    let mut seen: HashSet<JobId> = HashSet::new();

    for descriptor in batch {
        let Some(id) = descriptor.get("id").and_then(JobId::from_value) else {
            admission.skipped += 1;
            continue;
        };
        let args = descriptor.get("args").filter(|a| !a.is_null());

        let Some(args) = args else {
            admission.rejected.push(id);
            continue;
        };
        if admission.accepted.len() >= ceiling || is_live(&id) || seen.contains(&id) {
            admission.rejected.push(id);
            continue;
        }

        let kind = descriptor
            .get("kind")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let _ = seen.insert(id.clone());
        admission.accepted.push(WorkItem::new(id, kind, args.clone()));
    }
    admission
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
