//! Executor bridge: runs accepted jobs and reports their outcome.
//!
//! Jobs never carry code. Each job's `kind` selects a [`JobHandler`]
//! registered up front in a [`HandlerRegistry`]; the job's `args` are
//! passed to it as data.
//!
//! # Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`registry`] | kind → handler map with an optional fallback kind |
//! | [`builtin`] | `echo` and `sleep` handlers |

pub mod builtin;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use proletariat_core::constants::{ENOHANDLER, EPANIC};
use proletariat_core::protocol::JobOutcome;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use registry::HandlerRegistry;

use crate::events::{AgentEvent, AgentEvents, Completion};
use crate::ledger::WorkItem;

/// Failure reported by a handler. Sent to the manager as the job's `err`.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {description}")]
pub struct JobFailure {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

impl JobFailure {
    /// Failure with `code` and `description`.
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Wire form: `{"code": ..., "description": ...}`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "code": self.code, "description": self.description })
    }
}

/// A kind of job this agent knows how to run.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Kind name matched against a job's `kind`.
    fn kind(&self) -> &str;

    /// Run one job.
    async fn run(&self, args: Value) -> Result<Value, JobFailure>;
}

/// Runs every job on its own task.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<HandlerRegistry>,
}

impl Executor {
    /// Executor over `registry`.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Run `item` on a new task and report through `completion`.
    pub fn dispatch(&self, item: WorkItem, completion: Completion) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let job_id = item.id.clone();
            let outcome = execute(&registry, item).await;
            if !completion.complete(outcome) {
                debug!(job_id = %job_id, "result discarded");
            }
        })
    }

    /// Drain `events`: dispatch work, log the rest.
    ///
    /// Returns the `Fatal` event if one arrives, or `None` once the agent
    /// is gone.
    pub async fn run(&self, events: &mut AgentEvents) -> Option<AgentEvent> {
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Work { item, completion } => {
                    drop(self.dispatch(item, completion));
                }
                AgentEvent::Ready { agent_id } => info!(%agent_id, "agent ready"),
                AgentEvent::Error { message } => warn!(%message, "agent error"),
                AgentEvent::Close => info!("manager connection closed"),
                fatal @ AgentEvent::Fatal { .. } => return Some(fatal),
            }
        }
        None
    }
}

async fn execute(registry: &HandlerRegistry, item: WorkItem) -> JobOutcome {
    let Some(handler) = registry.resolve(item.kind.as_deref()) else {
        let kind = item.kind.as_deref().unwrap_or("<none>");
        warn!(job_id = %item.id, kind, "no handler for job");
        return JobOutcome::failure(
            JobFailure::new(ENOHANDLER, format!("no handler for kind '{kind}'")).to_value(),
        );
    };

    let job_id = item.id;
    let args = item.args;
    match tokio::spawn(async move { handler.run(args).await }).await {
        Ok(Ok(data)) => JobOutcome::success(data),
        Ok(Err(failure)) => {
            debug!(job_id = %job_id, %failure, "job failed");
            JobOutcome::failure(failure.to_value())
        }
        Err(join_error) => {
            error!(job_id = %job_id, error = %join_error, "job handler panicked");
            JobOutcome::failure(JobFailure::new(EPANIC, join_error.to_string()).to_value())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proletariat_core::ids::JobId;
    use serde_json::json;

    struct Panics;

    #[async_trait]
    impl JobHandler for Panics {
        fn kind(&self) -> &str {
            "panics"
        }

        async fn run(&self, _args: Value) -> Result<Value, JobFailure> {
            panic!("handler bug");
        }
    }

    struct Fails;

    #[async_trait]
    impl JobHandler for Fails {
        fn kind(&self) -> &str {
            "fails"
        }

        async fn run(&self, _args: Value) -> Result<Value, JobFailure> {
            Err(JobFailure::new("EBOOM", "it broke"))
        }
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::with_builtins();
        registry.register(Arc::new(Panics));
        registry.register(Arc::new(Fails));
        registry
    }

    fn job(kind: Option<&str>, args: Value) -> WorkItem {
        WorkItem::new(JobId::Number(1), kind.map(str::to_owned), args)
    }

    #[tokio::test]
    async fn known_kind_succeeds() {
        let outcome = execute(&registry(), job(Some("echo"), json!({"x": 1}))).await;
        assert_eq!(outcome, JobOutcome::success(json!({"x": 1})));
    }

    #[tokio::test]
    async fn handler_failure_becomes_err() {
        let outcome = execute(&registry(), job(Some("fails"), json!({}))).await;
        assert_eq!(outcome.err, json!({"code": "EBOOM", "description": "it broke"}));
        assert!(outcome.data.is_null());
    }

    #[tokio::test]
    async fn unknown_kind_is_enohandler() {
        let outcome = execute(&registry(), job(Some("nope"), json!({}))).await;
        assert_eq!(outcome.err["code"], ENOHANDLER);
        let outcome = execute(&registry(), job(None, json!({}))).await;
        assert_eq!(outcome.err["code"], ENOHANDLER);
    }

    #[tokio::test]
    async fn fallback_runs_unknown_kinds() {
        let mut registry = registry();
        assert!(registry.set_fallback("echo"));
        let outcome = execute(&registry, job(None, json!([1]))).await;
        assert_eq!(outcome, JobOutcome::success(json!([1])));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let outcome = execute(&registry(), job(Some("panics"), json!({}))).await;
        assert_eq!(outcome.err["code"], EPANIC);
    }

    #[test]
    fn failure_wire_form() {
        let failure = JobFailure::new(ENOHANDLER, "none");
        assert_eq!(failure.to_string(), "ENOHANDLER: none");
        assert_eq!(
            failure.to_value(),
            serde_json::to_value(&failure).unwrap()
        );
    }
}
