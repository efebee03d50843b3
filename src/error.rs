//! Custom error types for the simulator.
//!
//! `MultimeterError` is the single error enum shared by every layer of the
//! crate. It follows the usual `thiserror` layout: wrapped library errors use
//! `#[from]` so that `?` works throughout, and domain failures carry enough
//! context to be logged or echoed back to a client.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: figment could not read or deserialize the configuration.
//! - **`Configuration`**: the configuration parsed but is semantically invalid
//!   (zero channels, inverted perturbation interval, ...).
//! - **`Io`**: any socket or file I/O failure.
//! - **`Bind`**: the listener could not bind its socket path. This is the only
//!   fatal error of a running server.
//! - **`UnknownChannel`**: a `ChannelId` outside the fixed channel set reached
//!   the store. Commands are validated before dispatch, so this signals an
//!   internal inconsistency and is reported to the client as an exception.
//! - **`NotConnected`** / **`ConnectionClosed`**: client-side connection
//!   failures surfaced by `MultimeterClient`.
//! - **`Internal`**: a validated command could not be dispatched. Reported to
//!   the client as an exception.
//!
//! Client-visible command failures are *not* errors: they are ordinary
//! `fail` responses built by the command processor.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, MultimeterError>;

/// Errors raised by the simulator, its server and its client.
#[derive(Error, Debug)]
pub enum MultimeterError {
    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listener socket could not be created or bound.
    #[error("Failed to bind socket {}: {source}", path.display())]
    Bind {
        /// Socket path that was being bound.
        path: PathBuf,
        /// Underlying bind error.
        #[source]
        source: std::io::Error,
    },

    /// A channel id outside the configured channel set was addressed.
    #[error("unknown channel id {id} (channel count is {count})")]
    UnknownChannel {
        /// Offending channel index.
        id: usize,
        /// Number of channels in the store.
        count: usize,
    },

    /// The client has no live connection and reconnecting failed.
    #[error("Not connected to {}: {reason}", path.display())]
    NotConnected {
        /// Socket path the client tried to reach.
        path: PathBuf,
        /// Why the connection attempt failed.
        reason: String,
    },

    /// The peer closed the connection or an exchange was interrupted.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// An invariant between validation and dispatch did not hold.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for MultimeterError {
    fn from(value: figment::Error) -> Self {
        MultimeterError::Config(Box::new(value))
    }
}

impl MultimeterError {
    /// Whether the error leaves the process able to keep serving.
    ///
    /// Only startup resource failures are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MultimeterError::Bind { .. }
                | MultimeterError::Config(_)
                | MultimeterError::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_message_names_id_and_count() {
        let err = MultimeterError::UnknownChannel { id: 7, count: 2 };
        assert_eq!(err.to_string(), "unknown channel id 7 (channel count is 2)");
        assert!(!err.is_fatal());
    }

    #[test]
    fn internal_errors_are_not_fatal() {
        let err = MultimeterError::Internal("channel vanished".to_string());
        assert_eq!(err.to_string(), "Internal error: channel vanished");
        assert!(!err.is_fatal());
    }

    #[test]
    fn bind_failure_is_fatal() {
        let err = MultimeterError::Bind {
            path: PathBuf::from("/tmp/multimeter.sock"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/tmp/multimeter.sock"));
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
            Ok(())
        }
        match fails() {
            Err(MultimeterError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
