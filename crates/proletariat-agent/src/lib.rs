//! # proletariat-agent
//!
//! Worker side of the proletariat job protocol. An [`Agent`] connects to a
//! manager, offers a fixed number of execution slots, accepts pushed jobs up
//! to that capacity and reports their results back in `done` batches.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`machine`] | sans-IO state machine returning [`machine::Effect`]s |
//! | [`capacity`] | slot counter and batch admission |
//! | [`ledger`] | in-flight jobs with tombstones and compaction |
//! | [`batcher`] | pending results and flush rule |
//! | [`correlator`] | answer routing against the outstanding command |
//! | [`transport`] | newline-delimited JSON over TCP |
//! | [`executor`] | handler registry and per-job tasks |
//!
//! The connection supervisor and the cleanup scheduler are internal tasks
//! spawned by [`Agent::start`].
//!
//! ## Crate Position
//!
//! Depends on `proletariat-core` and `proletariat-settings`. Used by the
//! `proletariat` binary.

#![deny(unsafe_code)]

mod agent;
pub mod batcher;
pub mod capacity;
mod cleanup;
mod connection;
pub mod correlator;
pub mod errors;
pub mod events;
pub mod executor;
pub mod ledger;
pub mod machine;
pub mod state;
pub mod transport;

pub use agent::Agent;
pub use errors::{AgentError, Result};
pub use events::{AgentEvent, AgentEvents, Completion};
pub use executor::{Executor, HandlerRegistry, JobFailure, JobHandler};
pub use ledger::WorkItem;
pub use state::{AgentSnapshot, AgentStatus};
