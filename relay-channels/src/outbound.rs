//! Outbound dispatch.
//!
//! Sends the chunks of a reply one line at a time, in order, with a fixed
//! pause between consecutive lines so the network does not flood-kick us.

use crate::message::{ChannelType, OutgoingMessage};
use crate::traits::Channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default pause between consecutive lines.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a send operation.
#[derive(Debug)]
pub struct SendResult {
    /// Whether every chunk was sent
    pub success: bool,
    /// Message ID returned by the channel for the last line sent (if any)
    pub message_id: Option<String>,
    /// Number of chunks delivered
    pub delivered: usize,
    /// Error message (if failed)
    pub error: Option<String>,
}

/// Paced sender over a single channel.
pub struct OutboundRouter {
    channel: Arc<dyn Channel>,
    interval: Duration,
}

impl OutboundRouter {
    /// Create a router with the default send interval.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            interval: DEFAULT_SEND_INTERVAL,
        }
    }

    /// Set the pause between consecutive lines.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Send a single line.
    pub async fn send(&self, message: OutgoingMessage) -> SendResult {
        self.send_chunks(message.channel_type, &message.target, std::iter::once(message.text))
            .await
    }

    /// Send `chunks` to `target` in order.
    ///
    /// Sleeps between sends but not after the last one. Stops at the first
    /// failure; the result reports how many chunks made it out.
    pub async fn send_chunks<I>(&self, channel_type: ChannelType, target: &str, chunks: I) -> SendResult
    where
        I: IntoIterator<Item = String>,
    {
        let start = Instant::now();
        let mut delivered = 0;
        let mut message_id = None;

        for text in chunks {
            if delivered > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }

            let message = OutgoingMessage {
                channel_type,
                target: target.to_string(),
                text,
            };

            match self.channel.send(message).await {
                Ok(id) => {
                    delivered += 1;
                    message_id = Some(id);
                }
                Err(e) => {
                    tracing::warn!(
                        channel = self.channel.name(),
                        target_name = %target,
                        delivered,
                        error = %e,
                        "Send failed, dropping the rest of the reply"
                    );
                    return SendResult {
                        success: false,
                        message_id,
                        delivered,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        tracing::debug!(
            channel = self.channel.name(),
            target_name = %target,
            delivered,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reply sent"
        );

        SendResult {
            success: true,
            message_id,
            delivered,
            error: None,
        }
    }
}
