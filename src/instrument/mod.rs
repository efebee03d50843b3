//! The simulated instrument: channels, their state machine, the lock-guarded
//! store, and the background processes that keep it looking alive.

pub mod channel;
pub mod rng;
pub mod simulation;
pub mod state_machine;
pub mod store;

pub use channel::{Channel, ChannelId, ChannelState, Range};
pub use simulation::SimulationScheduler;
pub use state_machine::{ChannelCommand, Outcome, Perturbation, Transition};
pub use store::{ChannelStore, CommandReport};
