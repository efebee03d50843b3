//! Channel finite-state machine.
//!
//! Every state change a channel can undergo is decided here by pure functions
//! with no locking and no I/O. The store runs them inside its critical section;
//! tests exercise them directly.
//!
//! | Command        | Accepted when               | Next state |
//! |----------------|-----------------------------|------------|
//! | `StartMeasure` | state != Error              | Measuring  |
//! | `SetRange`     | state == Idle               | unchanged  |
//! | `StopMeasure`  | state not in {Error, Busy}  | Idle       |
//! | `GetStatus`    | state != Error              | unchanged  |
//! | `GetResult`    | state == Measuring          | unchanged  |
//! | `Diagnostic`   | state == Error              | Idle       |
//!
//! Rejected commands never change the state.

use super::channel::{ChannelState, Range};

/// A client command addressed at a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Begin measuring.
    StartMeasure,
    /// Select a new voltage range.
    SetRange(Range),
    /// Return to Idle.
    StopMeasure,
    /// Report the current state.
    GetStatus,
    /// Report the last reading.
    GetResult,
    /// Clear an Error.
    Diagnostic,
}

/// Whether the command's precondition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Precondition held; the effect was applied.
    Accepted,
    /// Precondition failed; nothing changed.
    Rejected,
}

impl Outcome {
    /// Shorthand for `== Outcome::Accepted`.
    pub fn is_accepted(self) -> bool {
        self == Outcome::Accepted
    }
}

/// Result of running a command against a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the command.
    pub next: ChannelState,
    /// Whether the command was accepted.
    pub outcome: Outcome,
}

impl Transition {
    fn accept(next: ChannelState) -> Self {
        Self {
            next,
            outcome: Outcome::Accepted,
        }
    }

    fn reject(state: ChannelState) -> Self {
        Self {
            next: state,
            outcome: Outcome::Rejected,
        }
    }
}

/// Decide the effect of `command` on a channel currently in `state`.
pub fn transition(state: ChannelState, command: &ChannelCommand) -> Transition {
    use ChannelState::*;

    match (command, state) {
        (ChannelCommand::StartMeasure, Error) => Transition::reject(state),
        (ChannelCommand::StartMeasure, _) => Transition::accept(Measuring),

        (ChannelCommand::SetRange(_), Idle) => Transition::accept(Idle),
        (ChannelCommand::SetRange(_), _) => Transition::reject(state),

        (ChannelCommand::StopMeasure, Error | Busy) => Transition::reject(state),
        (ChannelCommand::StopMeasure, _) => Transition::accept(Idle),

        (ChannelCommand::GetStatus, Error) => Transition::reject(state),
        (ChannelCommand::GetStatus, _) => Transition::accept(state),

        (ChannelCommand::GetResult, Measuring) => Transition::accept(state),
        (ChannelCommand::GetResult, _) => Transition::reject(state),

        (ChannelCommand::Diagnostic, Error) => Transition::accept(Idle),
        (ChannelCommand::Diagnostic, _) => Transition::reject(state),
    }
}

/// Outcome of one perturber roll for a Measuring channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perturbation {
    /// Leave the channel alone.
    Stable,
    /// Occupy the channel; it recovers after a delay.
    Busy,
    /// Fault the channel until diagnosed.
    Fault,
}

impl Perturbation {
    /// Map a roll in `[0, 1)` to a perturbation.
    ///
    /// `roll < error_threshold` faults, `roll < busy_threshold` occupies,
    /// anything else is stable.
    pub fn from_roll(roll: f64, error_threshold: f64, busy_threshold: f64) -> Self {
        if roll < error_threshold {
            Perturbation::Fault
        } else if roll < busy_threshold {
            Perturbation::Busy
        } else {
            Perturbation::Stable
        }
    }

    /// State a Measuring channel moves to. Other states are never perturbed.
    pub fn apply(self, state: ChannelState) -> ChannelState {
        match (state, self) {
            (ChannelState::Measuring, Perturbation::Fault) => ChannelState::Error,
            (ChannelState::Measuring, Perturbation::Busy) => ChannelState::Busy,
            _ => state,
        }
    }
}

/// Deferred Busy recovery: only a channel that is still Busy returns to Measuring.
pub fn recover(state: ChannelState) -> ChannelState {
    match state {
        ChannelState::Busy => ChannelState::Measuring,
        other => other,
    }
}
