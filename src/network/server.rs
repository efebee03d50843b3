//! Unix socket listener.
//!
//! Binds the configured socket path, removing a stale socket file left by a
//! previous run, and accepts connections until shutdown is signalled. Each
//! connection gets its own task running [`handle_connection`]; the accept loop
//! never waits on a handler.

use super::connection::handle_connection;
use super::session::SessionManager;
use crate::error::{AppResult, MultimeterError};
use crate::protocol::CommandProcessor;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Bound listener, ready to [`run`](MultimeterServer::run).
pub struct MultimeterServer {
    listener: UnixListener,
    socket_path: PathBuf,
    processor: CommandProcessor,
    sessions: SessionManager,
}

impl MultimeterServer {
    /// Bind `socket_path`. Bind failures are fatal to the caller.
    pub fn bind(
        socket_path: impl AsRef<Path>,
        processor: CommandProcessor,
        sessions: SessionManager,
    ) -> AppResult<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        remove_stale_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|source| MultimeterError::Bind {
            path: socket_path.clone(),
            source,
        })?;
        info!(
            socket = %socket_path.display(),
            channels = processor.store().len(),
            "Multimeter server listening"
        );

        Ok(Self {
            listener,
            socket_path,
            processor,
            sessions,
        })
    }

    /// Path the listener is bound to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Registry of connections accepted by this server.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Accept connections until `shutdown` becomes `true` or its sender is
    /// dropped, then remove the socket file.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let mut next_peer = 0u64;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accept = self.listener.accept() => match accept {
                    Ok((stream, _addr)) => {
                        next_peer += 1;
                        let peer = format!("client-{}", next_peer);
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            self.processor.clone(),
                            self.sessions.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => error!(error = %e, "Accept error"),
                },
            }
        }

        drop(self.listener);
        if let Err(e) = fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove socket file");
            }
        }
        info!(socket = %self.socket_path.display(), "Multimeter server stopped");
        Ok(())
    }
}

fn remove_stale_socket(path: &Path) -> AppResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            warn!(socket = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MultimeterError::Bind {
            path: path.to_path_buf(),
            source,
        }),
    }
}
