//! # Multimeter Simulator
//!
//! A simulated multi-channel multimeter served over a Unix stream socket.
//! Clients send one ASCII command per line and receive one `ok`/`fail` line
//! back. Behind the protocol, every channel runs a small state machine that
//! background tasks keep alive with fresh readings and the occasional fault.
//!
//! ## Crate Structure
//!
//! - **`instrument`**: channels, the pure state machine, the lock-guarded
//!   `ChannelStore`, and the `SimulationScheduler` that samples voltages and
//!   perturbs channel states.
//! - **`protocol`**: command grammar, response lines, and the
//!   `CommandProcessor` that validates and executes commands.
//! - **`network`**: the Unix socket listener, per-connection handlers and
//!   session bookkeeping.
//! - **`client`**: `MultimeterClient`, a connection with a single reconnect.
//! - **`console`**: the interactive prompt used by `multimeter console`.
//! - **`config`**: figment-based configuration (TOML file + `MULTIMETER_`
//!   environment variables).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the crate-wide `MultimeterError`.

pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod network;
pub mod protocol;

pub use error::{AppResult, MultimeterError};
