//! Channel traits for implementing chat transports.

use crate::message::{ChannelMessage, OutgoingMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not ready")]
    NotReady,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Chat transport.
///
/// Implement this trait to add support for a new chat network.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Initialize the channel (connect, register, etc.).
    async fn init(&mut self) -> ChannelResult<()>;

    /// Send one line. Returns a local identifier for the sent line.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Deliver inbound messages into `inbound` until the transport closes.
    ///
    /// Messages are delivered in arrival order.
    async fn listen(&self, inbound: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()>;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ChannelError::NotReady.to_string(), "Channel not ready");
        assert_eq!(
            ChannelError::SendFailed("closed".into()).to_string(),
            "Message send failed: closed"
        );
    }

    #[test]
    fn test_io_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ChannelError = io.into();
        assert!(matches!(err, ChannelError::Connection(_)));
    }
}
