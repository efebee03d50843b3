//! Client for the multimeter line protocol.
//!
//! A [`MultimeterClient`] owns at most one connection. When a command is sent
//! without a live connection the client makes exactly one reconnect attempt;
//! any write failure, read failure or EOF drops the connection and is
//! reported to the caller, who decides whether to try again.

use crate::error::{AppResult, MultimeterError};
use crate::protocol::{Response, LINE_TERMINATOR};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Connection to a running multimeter server.
#[derive(Debug)]
pub struct MultimeterClient {
    socket_path: PathBuf,
    stream: Option<BufReader<UnixStream>>,
}

impl MultimeterClient {
    /// Disconnected client; the first command connects lazily.
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            stream: None,
        }
    }

    /// Client connected to `socket_path`.
    pub async fn connect(socket_path: impl AsRef<Path>) -> AppResult<Self> {
        let mut client = Self::new(socket_path);
        client.reconnect().await?;
        Ok(client)
    }

    /// Server socket this client talks to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop any current connection and open a new one.
    pub async fn reconnect(&mut self) -> AppResult<()> {
        self.stream = None;
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| MultimeterError::NotConnected {
                path: self.socket_path.clone(),
                reason: e.to_string(),
            })?;
        debug!(socket = %self.socket_path.display(), "Connected to multimeter server");
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Close the current connection, if any.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// Send one command line and return the response line without its
    /// terminator.
    pub async fn send_command(&mut self, command: &str) -> AppResult<String> {
        if self.stream.is_none() {
            warn!(socket = %self.socket_path.display(), "Not connected, reconnecting");
            self.reconnect().await?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(MultimeterError::NotConnected {
                path: self.socket_path.clone(),
                reason: "no connection after reconnect".to_string(),
            });
        };

        let result = exchange(stream, command).await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    /// [`send_command`](Self::send_command), parsing the reply.
    pub async fn request(&mut self, command: &str) -> AppResult<Response> {
        let line = self.send_command(command).await?;
        Response::parse(&line).ok_or_else(|| {
            MultimeterError::ConnectionClosed(format!("malformed response '{}'", line))
        })
    }
}

async fn exchange(stream: &mut BufReader<UnixStream>, command: &str) -> AppResult<String> {
    let line = format!("{}{}", command, LINE_TERMINATOR);
    stream.get_mut().write_all(line.as_bytes()).await?;

    let mut reply = Vec::new();
    let n = stream.read_until(b'\r', &mut reply).await?;
    if n == 0 {
        return Err(MultimeterError::ConnectionClosed(
            "server closed the connection".to_string(),
        ));
    }

    let reply = String::from_utf8_lossy(&reply);
    Ok(reply.trim_end_matches(['\r', '\n']).to_string())
}
