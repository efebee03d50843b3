//! Authoritative channel collection and its single store-wide lock.
//!
//! All access to channel state goes through `ChannelStore`. Each public
//! method is one critical section: a decision and the mutation that depends
//! on it happen under the same lock acquisition, so there is no window in
//! which another task can invalidate a check before it is acted upon.
//!
//! The lock is a `parking_lot::Mutex` and is only ever held inside
//! synchronous closures, never across an `.await`.

use super::channel::{Channel, ChannelId, ChannelState, Range};
use super::state_machine::{self, ChannelCommand, Outcome};
use crate::error::{AppResult, MultimeterError};
use parking_lot::Mutex;

/// What a command observed and did, captured inside the critical section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandReport {
    /// Whether the precondition held.
    pub outcome: Outcome,
    /// State at decision time.
    pub state: ChannelState,
    /// State after the command.
    pub next: ChannelState,
    /// Range after the command.
    pub range: Range,
    /// Reading at decision time, if one was sampled under the current range.
    pub reading: Option<f64>,
}

/// Fixed-size, lock-guarded set of channels.
#[derive(Debug)]
pub struct ChannelStore {
    channels: Mutex<Vec<Channel>>,
    count: usize,
}

impl ChannelStore {
    /// Build `count` channels named `channel0..channel{count-1}`, all Idle in range0.
    pub fn new(count: usize) -> Self {
        let channels = (0..count).map(|i| Channel::new(ChannelId(i))).collect();
        Self {
            channels: Mutex::new(channels),
            count,
        }
    }

    /// Number of channels. Fixed for the lifetime of the store.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the store holds no channels.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Resolve a channel name to its handle.
    pub fn find_by_name(&self, name: &str) -> Option<ChannelId> {
        self.channels
            .lock()
            .iter()
            .position(|channel| channel.name() == name)
            .map(ChannelId)
    }

    /// Run `f` on one channel under the lock.
    pub fn with_channel<R>(&self, id: ChannelId, f: impl FnOnce(&mut Channel) -> R) -> AppResult<R> {
        let mut channels = self.channels.lock();
        let channel = channels
            .get_mut(id.index())
            .ok_or(MultimeterError::UnknownChannel {
                id: id.index(),
                count: self.count,
            })?;
        Ok(f(channel))
    }

    /// Run `f` on the whole channel set under the lock.
    pub fn with_channels<R>(&self, f: impl FnOnce(&mut [Channel]) -> R) -> R {
        let mut channels = self.channels.lock();
        f(channels.as_mut_slice())
    }

    /// Execute a client command against one channel in a single critical section.
    pub fn apply(&self, id: ChannelId, command: ChannelCommand) -> AppResult<CommandReport> {
        self.with_channel(id, |channel| {
            let state = channel.state;
            let reading = channel.reading();
            let transition = state_machine::transition(state, &command);

            if transition.outcome.is_accepted() {
                channel.state = transition.next;
                match command {
                    ChannelCommand::SetRange(range) => {
                        channel.range = range;
                        channel.invalidate_reading();
                    }
                    // A new measurement never reports a reading from the previous one
                    ChannelCommand::StartMeasure if state == ChannelState::Idle => {
                        channel.invalidate_reading();
                    }
                    _ => {}
                }
            }

            CommandReport {
                outcome: transition.outcome,
                state,
                next: channel.state,
                range: channel.range,
                reading,
            }
        })
    }

    /// Busy auto-recovery: back to Measuring only if the channel is still Busy.
    ///
    /// Returns whether the channel was reset.
    pub fn recover_if_busy(&self, id: ChannelId) -> AppResult<bool> {
        self.with_channel(id, |channel| {
            let next = state_machine::recover(channel.state);
            let changed = next != channel.state;
            channel.state = next;
            changed
        })
    }

    /// Copy of one channel.
    pub fn channel(&self, id: ChannelId) -> AppResult<Channel> {
        self.with_channel(id, |channel| channel.clone())
    }

    /// Consistent copy of every channel.
    pub fn snapshot(&self) -> Vec<Channel> {
        self.channels.lock().clone()
    }
}
