//! Routing of inbound envelopes against the single outstanding command.

use proletariat_core::protocol::{AnswerEnvelope, Command, Inbound};
use serde_json::Value;

/// Where an inbound message goes.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    /// Answer to our `offer`.
    Handshake(AnswerEnvelope),
    /// Answer to `ping` or `done`; logged only.
    Informational {
        /// Command being answered.
        to: Command,
        /// Manager's description, if any.
        description: Option<String>,
    },
    /// Work batch for intake.
    Push(Value),
    /// Answer that does not match the outstanding command.
    Unexpected {
        /// Command the answer claims to answer.
        to: Option<String>,
        /// Command actually outstanding.
        outstanding: Option<Command>,
    },
    /// Anything else; dropped.
    Ignored {
        /// Command name, if the envelope had one.
        command: Option<String>,
    },
}

/// Tracks the last command sent and routes what comes back.
#[derive(Debug, Default)]
pub struct Correlator {
    last_command: Option<Command>,
}

impl Correlator {
    /// Nothing outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `command` as the one awaiting an answer.
    pub fn record(&mut self, command: Command) {
        self.last_command = Some(command);
    }

    /// Forget the outstanding command.
    pub fn clear(&mut self) {
        self.last_command = None;
    }

    /// Command awaiting an answer.
    pub fn outstanding(&self) -> Option<Command> {
        self.last_command
    }

    /// Route a decoded message.
    pub fn route(&self, inbound: Inbound) -> Route {
        match inbound {
            Inbound::Push { work } => Route::Push(work),
            Inbound::Unknown { command } => Route::Ignored { command },
            Inbound::Answer(answer) => self.route_answer(answer),
        }
    }

    fn route_answer(&self, answer: AnswerEnvelope) -> Route {
        let outstanding = self.last_command;
        let matches = matches!(
            (answer.to.as_deref(), outstanding),
            (Some(to), Some(cmd)) if to == cmd.as_str()
        );
        if !matches {
            return Route::Unexpected {
                to: answer.to,
                outstanding,
            };
        }
        match outstanding {
            Some(Command::Offer) => Route::Handshake(answer),
            Some(to @ (Command::Ping | Command::Done)) => Route::Informational {
                to,
                description: answer.description,
            },
            _ => Route::Ignored {
                command: Some(Command::Answer.as_str().to_owned()),
            },
        }
    }
}
