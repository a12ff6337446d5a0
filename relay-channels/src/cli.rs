//! CLI channel adapter for interactive terminal sessions.
//!
//! Every stdin line is treated as a direct message from `user`, so the relay
//! answers all of them.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Sender identity for terminal input.
pub const CLI_USER: &str = "user";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel {
    nick: String,
}

impl CliChannel {
    /// Create a new CLI channel speaking as `nick`.
    pub fn new(nick: impl Into<String>) -> Self {
        Self { nick: nick.into() }
    }

    /// Turn one input line into a message, or `None` for blank lines.
    pub fn to_message(&self, line: &str) -> Option<ChannelMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(ChannelMessage::new(
            ChannelType::Cli,
            CLI_USER,
            self.nick.as_str(),
            line,
            true,
        ))
    }

    /// Forward lines from `reader` until EOF or a quit command.
    async fn read_lines<R: AsyncBufRead + Unpin>(
        &self,
        reader: R,
        inbound: &mpsc::Sender<ChannelMessage>,
    ) -> ChannelResult<()> {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if is_quit(&line) {
                break;
            }
            let Some(msg) = self.to_message(&line) else {
                continue;
            };

            inbound
                .send(msg)
                .await
                .map_err(|_| ChannelError::Internal("inbound queue closed".into()))?;
        }
        Ok(())
    }
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim(), "/quit" | "/exit")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        println!("<{}> {}", self.nick, message.text);
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen(&self, inbound: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        self.read_lines(BufReader::new(io::stdin()), &inbound).await
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
