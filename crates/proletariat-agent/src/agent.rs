//! The agent handle and the state it shares with its tasks.
//!
//! All mutable state sits in one [`AgentCore`] behind a `parking_lot::Mutex`.
//! Every event source (link reader, connection supervisor, offer retry
//! timer, cleanup scheduler, completion handles) locks, runs one synchronous
//! transition and performs the returned effects before unlocking. Effects
//! never block: outbound text goes to the link's unbounded queue and
//! notifications to an unbounded channel, so the lock is never held across
//! an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use proletariat_core::ids::{AgentId, IdSource, JobId};
use proletariat_core::protocol::JobOutcome;
use proletariat_settings::AgentSettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cleanup;
use crate::connection;
use crate::errors::{AgentError, Result};
use crate::events::{AgentEvent, AgentEvents, Completion};
use crate::ledger::Ticket;
use crate::machine::{AgentCore, Effect};
use crate::state::{AgentSnapshot, AgentStatus};
use crate::transport::{Dialer, LinkSender, TcpDialer};

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct Inner {
    pub(crate) core: AgentCore,
    pub(crate) link: Option<LinkSender>,
    supervising: bool,
    cleanup_started: bool,
}

pub(crate) struct Shared {
    pub(crate) inner: Mutex<Inner>,
    pub(crate) settings: AgentSettings,
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) cancel: CancellationToken,
    events: mpsc::UnboundedSender<AgentEvent>,
}

impl Shared {
    pub(crate) fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }

    /// Perform the effects of one transition. Called with the lock held.
    pub(crate) fn apply(self: &Arc<Self>, inner: &mut Inner, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(command) => {
                    let name = command.command();
                    match serde_json::to_string(&command) {
                        Ok(text) => {
                            let sent = inner.link.as_ref().is_some_and(|link| link.send(text));
                            if !sent {
                                debug!(command = %name, "link gone, command dropped");
                            }
                        }
                        Err(error) => warn!(command = %name, %error, "failed to encode command"),
                    }
                }
                Effect::ScheduleOfferRetry { epoch } => self.schedule_offer_retry(epoch),
                Effect::Dispatch {
                    item,
                    epoch,
                    ticket,
                } => {
                    let completion =
                        Completion::new(item.id.clone(), ticket, epoch, Arc::downgrade(self));
                    self.emit(AgentEvent::Work { item, completion });
                }
                Effect::Ready(agent_id) => self.emit(AgentEvent::Ready { agent_id }),
            }
        }
    }

    fn schedule_offer_retry(self: &Arc<Self>, epoch: u64) {
        let shared = Arc::clone(self);
        let delay = self.settings.offer_retry_delay();
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shared.cancel.cancelled() => return,
            }
            let mut inner = shared.inner.lock();
            let effects = inner.core.offer_retry(epoch);
            shared.apply(&mut inner, effects);
        }));
    }

    pub(crate) fn on_message(self: &Arc<Self>, text: &str) {
        let mut inner = self.inner.lock();
        match inner.core.on_message(text) {
            Ok(effects) => self.apply(&mut inner, effects),
            Err(error) => self.fatal(&mut inner, &error),
        }
    }

    pub(crate) fn complete(
        self: &Arc<Self>,
        job_id: &JobId,
        ticket: Ticket,
        epoch: u64,
        outcome: JobOutcome,
    ) -> bool {
        let mut inner = self.inner.lock();
        match inner.core.complete(job_id, ticket, epoch, outcome) {
            Ok(Some(effects)) => {
                self.apply(&mut inner, effects);
                true
            }
            Ok(None) => false,
            Err(error) => {
                self.fatal(&mut inner, &error);
                false
            }
        }
    }

    /// Returns `false` once the agent has stopped.
    pub(crate) fn cleanup_tick(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.core.status() == AgentStatus::Stopped {
            return false;
        }
        match inner.core.cleanup_tick() {
            Ok(_) => true,
            Err(error) => {
                self.fatal(&mut inner, &error);
                false
            }
        }
    }

    pub(crate) fn supervisor_exited(&self) {
        self.inner.lock().supervising = false;
    }

    fn fatal(&self, inner: &mut Inner, err: &AgentError) {
        error!(agent_id = %inner.core.id(), error = %err, "fatal accounting error, stopping agent");
        inner.core.stop();
        inner.link = None;
        self.cancel.cancel();
        self.emit(AgentEvent::Fatal {
            message: err.to_string(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A worker agent connected (or trying to connect) to one manager.
///
/// Dropping the agent stops its background tasks.
pub struct Agent {
    shared: Arc<Shared>,
}

impl Agent {
    /// Create an offline agent. Nothing runs until [`Agent::start`].
    pub fn new(settings: AgentSettings, ids: &dyn IdSource) -> (Self, AgentEvents) {
        Self::with_dialer(settings, ids, Arc::new(TcpDialer))
    }

    /// Create an agent that connects through `dialer`.
    pub fn with_dialer(
        mut settings: AgentSettings,
        ids: &dyn IdSource,
        dialer: Arc<dyn Dialer>,
    ) -> (Self, AgentEvents) {
        if let Err(error) = settings.validate() {
            warn!(%error, "invalid settings, keeping defaults for the manager address");
            settings.manager = AgentSettings::default().manager;
        }
        let id = ids.next_agent_id();
        let core = AgentCore::new(id, &settings);
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                core,
                link: None,
                supervising: false,
                cleanup_started: false,
            }),
            settings,
            dialer,
            cancel: CancellationToken::new(),
            events: tx,
        });
        (Self { shared }, AgentEvents::new(rx))
    }

    /// Begin connecting to the manager. Must be called inside a Tokio runtime.
    ///
    /// Fails with [`AgentError::Stopped`] after [`Agent::stop`], and with
    /// [`AgentError::AlreadyRunning`] (changing nothing) while a connection
    /// is being supervised.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.core.status() == AgentStatus::Stopped {
            return Err(AgentError::Stopped);
        }
        if inner.supervising {
            debug!(agent_id = %inner.core.id(), "start ignored, already running");
            return Err(AgentError::AlreadyRunning);
        }
        inner.supervising = true;
        info!(
            agent_id = %inner.core.id(),
            manager = %self.shared.settings.manager_addr(),
            slots = inner.core.available_slots(),
            "agent starting"
        );

        drop(tokio::spawn(connection::supervise(Arc::clone(&self.shared))));
        if !inner.cleanup_started {
            inner.cleanup_started = true;
            drop(tokio::spawn(cleanup::run(Arc::clone(&self.shared))));
        }
        Ok(())
    }

    /// Stop for good: close the link, cancel every timer, abandon all work.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.core.status() == AgentStatus::Stopped {
            return;
        }
        info!(agent_id = %inner.core.id(), "agent stopping");
        inner.core.stop();
        inner.link = None;
        self.shared.cancel.cancel();
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.shared.inner.lock().core.status()
    }

    /// Current id (manager-assigned once the handshake succeeded).
    pub fn id(&self) -> AgentId {
        self.shared.inner.lock().core.id().clone()
    }

    /// Free slots.
    pub fn available_slots(&self) -> usize {
        self.shared.inner.lock().core.available_slots()
    }

    /// Point-in-time copy of the agent state.
    pub fn snapshot(&self) -> AgentSnapshot {
        self.shared.inner.lock().core.snapshot()
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proletariat_core::ids::SequentialIds;

    fn unreachable_settings() -> AgentSettings {
        let mut settings = AgentSettings::default();
        settings.manager.port = 1;
        settings
    }

    #[test]
    fn new_agent_is_offline_with_full_slots() {
        let (agent, _events) = Agent::new(AgentSettings::default(), &SequentialIds::new());
        assert_eq!(agent.status(), AgentStatus::Offline);
        assert_eq!(agent.id().as_str(), "1");
        assert_eq!(agent.available_slots(), 10);
        assert_eq!(agent.snapshot().epoch, 0);
    }

    #[test]
    fn agents_get_distinct_ids_from_one_source() {
        let ids = SequentialIds::new();
        let (a, _ea) = Agent::new(AgentSettings::default(), &ids);
        let (b, _eb) = Agent::new(AgentSettings::default(), &ids);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn invalid_settings_are_corrected() {
        let mut settings = AgentSettings::default();
        settings.slots.max = 0;
        let (agent, _events) = Agent::new(settings, &SequentialIds::new());
        assert_eq!(agent.snapshot().max_slots, 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_without_side_effects() {
        let (agent, _events) = Agent::new(unreachable_settings(), &SequentialIds::new());
        agent.start().unwrap();
        assert_matches!(agent.start(), Err(AgentError::AlreadyRunning));
        agent.stop();
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let (agent, _events) = Agent::new(unreachable_settings(), &SequentialIds::new());
        agent.stop();
        assert_eq!(agent.status(), AgentStatus::Stopped);
        assert_matches!(agent.start(), Err(AgentError::Stopped));
    }
}
