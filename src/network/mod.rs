//! Unix socket server: listener, per-connection handlers and session tracking.

pub mod connection;
pub mod server;
pub mod session;

pub use connection::{handle_connection, LineFramer, MAX_LINE_BYTES};
pub use server::MultimeterServer;
pub use session::{Session, SessionManager};
