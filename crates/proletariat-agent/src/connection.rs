//! Connection supervision: dial, run the link, reconnect.
//!
//! Refused connects are retried forever at a fixed delay. Other connect
//! errors are reported and end supervision unless
//! `connection.retryAllConnectErrors` is set; a later [`Agent::start`]
//! resumes. A link that closes after connecting is always followed by a
//! reconnect.
//!
//! [`Agent::start`]: crate::Agent::start

use std::sync::Arc;

use metrics::counter;
use proletariat_core::constants::RECONNECTS_TOTAL;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::agent::Shared;
use crate::events::AgentEvent;
use crate::state::AgentStatus;
use crate::transport::{self, LinkEvent};

/// How a link session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    /// The peer closed the connection.
    Closed,
    /// The agent was stopped.
    Cancelled,
}

/// Supervisor loop. Runs until the agent stops or a connect error is not retryable.
pub(crate) async fn supervise(shared: Arc<Shared>) {
    let addr = shared.settings.manager_addr();
    let delay = shared.settings.reconnect_delay();
    let retry_all = shared.settings.connection.retry_all_connect_errors;

    loop {
        let dialed = tokio::select! {
            result = shared.dialer.dial(&addr) => result,
            () = shared.cancel.cancelled() => break,
        };

        match dialed {
            Ok(stream) => {
                if run_link(&shared, stream).await == LinkOutcome::Cancelled {
                    break;
                }
                info!(%addr, ?delay, "link closed, reconnecting");
            }
            Err(error) if error.is_connection_refused() => {
                debug!(%addr, ?delay, "connection refused, retrying");
            }
            Err(error) if retry_all => {
                warn!(%addr, %error, "connect failed, retrying");
                shared.emit(AgentEvent::Error {
                    message: error.to_string(),
                });
            }
            Err(error) => {
                warn!(%addr, %error, "connect failed, giving up until restarted");
                shared.emit(AgentEvent::Error {
                    message: error.to_string(),
                });
                break;
            }
        }

        counter!(RECONNECTS_TOTAL).increment(1);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.cancel.cancelled() => break,
        }
    }
    shared.supervisor_exited();
}

async fn run_link(shared: &Arc<Shared>, stream: TcpStream) -> LinkOutcome {
    let (sender, mut reader, _writer) =
        transport::open(stream, shared.settings.connection.max_frame_length);
    {
        let mut inner = shared.inner.lock();
        if inner.core.status() == AgentStatus::Stopped {
            return LinkOutcome::Cancelled;
        }
        inner.link = Some(sender);
        let effects = inner.core.connected();
        shared.apply(&mut inner, effects);
    }

    loop {
        let event = tokio::select! {
            event = reader.next_event() => event,
            () = shared.cancel.cancelled() => return LinkOutcome::Cancelled,
        };
        match event {
            LinkEvent::Message(text) => shared.on_message(&text),
            LinkEvent::Error(error) => {
                warn!(%error, "bad input from manager, link kept");
                shared.emit(AgentEvent::Error {
                    message: error.to_string(),
                });
            }
            LinkEvent::Closed => break,
        }
    }

    let mut inner = shared.inner.lock();
    inner.link = None;
    if inner.core.disconnected() {
        shared.emit(AgentEvent::Close);
    }
    LinkOutcome::Closed
}
