//! # proletariat-core
//!
//! Foundation types shared by every proletariat crate.
//!
//! - **Ids**: [`ids::AgentId`] and [`ids::JobId`], plus the injected
//!   [`ids::IdSource`] used to name a freshly created agent
//! - **Protocol**: [`protocol::Outbound`] envelopes the agent sends and the
//!   lenient [`protocol::Inbound`] decoding of what the manager sends
//! - **Constants**: protocol defaults and metric names
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `proletariat-settings`,
//! `proletariat-agent` and the `proletariat` binary.

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod protocol;
