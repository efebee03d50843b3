//! Command processor: one line in, one response out.
//!
//! Validation happens first and never touches the store. A valid command is
//! then resolved to its channel handle and executed with
//! [`ChannelStore::apply`], a single critical section, so the response always
//! reflects the state the decision was made on.
//!
//! Internal errors raised while dispatching are reported as
//! `fail, exception - <message>`; a panic is caught and reported as
//! `fail, unknown error`. Neither takes down the connection.

use super::command::{Command, Keyword};
use super::response::Response;
use crate::error::{AppResult, MultimeterError};
use crate::instrument::{ChannelCommand, ChannelStore};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

/// Parses, validates and executes protocol commands against a shared store.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    store: Arc<ChannelStore>,
}

impl CommandProcessor {
    /// Processor over a shared store.
    pub fn new(store: Arc<ChannelStore>) -> Self {
        Self { store }
    }

    /// The store commands run against.
    pub fn store(&self) -> &Arc<ChannelStore> {
        &self.store
    }

    /// Handle one command line and produce its response.
    pub fn process(&self, line: &str) -> Response {
        let command = match Command::parse(line, self.store.len()) {
            Ok(command) => command,
            Err(e) => {
                trace!(error = %e, "Rejected command line");
                return e.to_response();
            }
        };

        guarded(|| self.dispatch(&command))
    }

    fn dispatch(&self, command: &Command) -> AppResult<Response> {
        let id = self
            .store
            .find_by_name(&command.channel)
            .ok_or_else(|| MultimeterError::Internal(format!(
                "channel '{}' passed validation but is not in the store",
                command.channel
            )))?;
        let report = self.store.apply(id, command.action)?;
        let accepted = report.outcome.is_accepted();

        let response = match (command.keyword, command.action) {
            (Keyword::StartMeasure | Keyword::StopMeasure, _) => {
                Response::with_outcome(accepted, None)
            }
            (Keyword::SetRange, ChannelCommand::SetRange(range)) => {
                Response::with_outcome(accepted, Some(range.to_string()))
            }
            (Keyword::GetStatus, _) => {
                Response::with_outcome(accepted, Some(report.state.to_string()))
            }
            (Keyword::GetResult, _) => match report.reading {
                Some(value) if accepted => Response::ok_with(value.to_string()),
                _ => Response::fail(),
            },
            (Keyword::Diagnostic, _) => {
                Response::with_outcome(accepted, Some(command.channel.clone()))
            }
            (Keyword::SetRange, action) => {
                return Err(MultimeterError::Internal(format!(
                    "set_range parsed into mismatched action {:?}",
                    action
                )))
            }
        };
        Ok(response)
    }
}

/// Run a dispatch step, converting errors and panics into `fail` responses.
pub(crate) fn guarded(dispatch: impl FnOnce() -> AppResult<Response>) -> Response {
    match panic::catch_unwind(AssertUnwindSafe(dispatch)) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(error = %e, "Command dispatch failed");
            Response::fail_with(format!("exception - {}", e))
        }
        Err(_) => {
            warn!("Command dispatch panicked");
            Response::fail_with("unknown error")
        }
    }
}
