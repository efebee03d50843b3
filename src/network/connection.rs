//! Per-connection handler.
//!
//! Reads raw bytes, frames them into lines on `\r` or `\n`, hands each
//! non-empty trimmed line to the [`CommandProcessor`] and writes the response
//! back. A line that grows past [`MAX_LINE_BYTES`] without a terminator is
//! dropped with `fail, line too long`; bytes up to the next terminator are
//! discarded and the connection stays usable.

use super::session::SessionManager;
use crate::protocol::{CommandProcessor, Response};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Longest accepted command line, terminator excluded.
pub const MAX_LINE_BYTES: usize = 4096;

const READ_CHUNK_BYTES: usize = 1024;

/// One unit produced by [`LineFramer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, trimmed. May be empty.
    Line(String),
    /// A line exceeded the length limit and was dropped.
    Overlong,
}

/// Splits a byte stream into command lines.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line: usize,
    discarding: bool,
}

impl LineFramer {
    /// Framer accepting lines of at most `max_line` bytes.
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK_BYTES),
            max_line,
            discarding: false,
        }
    }

    /// Append bytes read from the connection.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete frame, or `None` if more input is needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                if self.discarding {
                    self.buf.clear();
                } else if self.buf.len() > self.max_line {
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Frame::Overlong);
                }
                return None;
            };

            let line = self.buf.split_to(pos);
            self.buf.advance(1);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line {
                return Some(Frame::Overlong);
            }
            return Some(Frame::Line(String::from_utf8_lossy(&line).trim().to_string()));
        }
    }
}

/// Serve one client until it disconnects, an I/O error occurs, or shutdown
/// is signalled. The session is registered for the handler's lifetime.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    processor: CommandProcessor,
    sessions: SessionManager,
    shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = sessions.open_session(peer.clone()).await;
    let span = tracing::info_span!("connection", session = %session.id, peer = %peer);

    async {
        info!("Client connected");
        serve_lines(stream, &processor, &sessions, &session.id, shutdown).await;

        let handled = sessions
            .remove_session(&session.id)
            .await
            .map_or(0, |s| s.commands_handled);
        info!(commands = handled, "Client disconnected");
    }
    .instrument(span)
    .await;
}

async fn serve_lines<S>(
    mut stream: S,
    processor: &CommandProcessor,
    sessions: &SessionManager,
    session_id: &str,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new(MAX_LINE_BYTES);
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        while let Some(frame) = framer.next_frame() {
            let response = match frame {
                Frame::Line(line) if line.is_empty() => continue,
                Frame::Line(line) => {
                    let response = processor.process(&line);
                    debug!(command = %line, response = %response, "Handled command");
                    sessions.record_command(session_id).await;
                    response
                }
                Frame::Overlong => {
                    warn!(limit = MAX_LINE_BYTES, "Dropped overlong command line");
                    Response::fail_with("line too long")
                }
            };

            if let Err(e) = stream.write_all(response.encode().as_bytes()).await {
                warn!(error = %e, "Failed to write response");
                return;
            }
        }

        if *shutdown.borrow_and_update() {
            debug!("Closing connection for shutdown");
            return;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Shutdown channel closed");
                    return;
                }
            }
            read = stream.read(&mut chunk) => match read {
                Ok(0) => return,
                Ok(n) => framer.extend(&chunk[..n]),
                Err(e) => {
                    warn!(error = %e, "Read error");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::ChannelStore;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    fn frames(framer: &mut LineFramer) -> Vec<Frame> {
        std::iter::from_fn(|| framer.next_frame()).collect()
    }

    #[test]
    fn splits_on_cr_and_lf() {
        let mut framer = LineFramer::new(64);
        framer.extend(b"get_status channel0\r\n  diagnostic channel1 \npartial");
        assert_eq!(
            frames(&mut framer),
            vec![
                Frame::Line("get_status channel0".into()),
                Frame::Line(String::new()),
                Frame::Line("diagnostic channel1".into()),
            ]
        );

        framer.extend(b" line\r");
        assert_eq!(frames(&mut framer), vec![Frame::Line("partial line".into())]);
    }

    #[test]
    fn overlong_line_is_discarded_up_to_terminator() {
        let mut framer = LineFramer::new(24);
        framer.extend(&[b'x'; 30]);
        assert_eq!(frames(&mut framer), vec![Frame::Overlong]);

        framer.extend(b"still the same line");
        assert!(frames(&mut framer).is_empty());

        framer.extend(b" end\rget_status channel0\r");
        assert_eq!(frames(&mut framer), vec![Frame::Line("get_status channel0".into())]);
    }

    #[test]
    fn overlong_line_with_terminator_in_one_chunk() {
        let mut framer = LineFramer::new(4);
        framer.extend(b"abcdefgh\rok\r");
        assert_eq!(
            frames(&mut framer),
            vec![Frame::Overlong, Frame::Line("ok".into())]
        );
    }

    #[tokio::test]
    async fn handler_answers_each_line_and_unregisters() {
        let processor = CommandProcessor::new(Arc::new(ChannelStore::new(2)));
        let sessions = SessionManager::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (client, server) = duplex(1024);

        let handler = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            processor,
            sessions.clone(),
            shutdown_rx,
        ));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        write_half
            .write_all(b"start_measure channel0\r\n\rget_status channel0\rbogus\r")
            .await
            .unwrap();

        let mut responses = Vec::new();
        for _ in 0..3 {
            let mut line = Vec::new();
            reader.read_until(b'\r', &mut line).await.unwrap();
            responses.push(String::from_utf8(line).unwrap());
        }
        assert_eq!(
            responses,
            vec!["ok\r", "ok, measure_state\r", "fail, unknown command\r"]
        );
        assert_eq!(sessions.active_count().await, 1);

        drop(write_half);
        drop(reader);
        handler.await.unwrap();
        assert_eq!(sessions.active_count().await, 0);
    }

    #[tokio::test]
    async fn handler_stops_on_shutdown() {
        let processor = CommandProcessor::new(Arc::new(ChannelStore::new(1)));
        let sessions = SessionManager::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_client, server) = duplex(64);

        let handler = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            processor,
            sessions.clone(),
            shutdown_rx,
        ));

        shutdown_tx.send_replace(true);
        handler.await.unwrap();
        assert_eq!(sessions.active_count().await, 0);
    }
}
