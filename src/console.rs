//! Interactive console: read a command per line, print the server's reply.
//!
//! Prompts with `> `. An empty line prints `fail, empty command line` without
//! contacting the server; `exit` or end of input quits. Client errors are
//! printed and the loop continues, so a restarted server is picked up by the
//! client's reconnect on the next command.

use crate::client::MultimeterClient;
use crate::error::AppResult;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const PROMPT: &str = "> ";
const EXIT_COMMAND: &str = "exit";

/// Run the prompt loop until `exit` or end of input.
pub async fn run<R, W>(client: &mut MultimeterClient, input: R, mut output: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            debug!("Console input closed");
            break;
        };
        let command = line.trim_end_matches('\r');

        let reply = if command.is_empty() {
            "fail, empty command line".to_string()
        } else if command == EXIT_COMMAND {
            break;
        } else {
            match client.send_command(command).await {
                Ok(response) => response,
                Err(e) => format!("error: {}", e),
            }
        };

        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    Ok(())
}
