//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Irc,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Irc => "irc",
            Self::Cli => "cli",
        }
    }
}

/// Inbound chat line, as delivered by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (generated locally, IRC has none)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Nick of the speaker
    pub sender: String,
    /// Where the line was sent: a channel name or the bot's own nick
    pub target: String,
    /// Message text
    pub text: String,
    /// Sent one-to-one to the bot
    pub is_direct: bool,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID for following this message through the logs
    pub trace_id: String,
}

impl ChannelMessage {
    /// Create a message stamped with a fresh ID, trace ID and the current time.
    pub fn new(
        channel_type: ChannelType,
        sender: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
        is_direct: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type,
            sender: sender.into(),
            target: target.into(),
            text: text.into(),
            is_direct,
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: relay_common::logging::generate_trace_id(),
        }
    }

    /// Where a reply to this message goes.
    pub fn response_target(&self) -> ResponseTarget {
        if self.is_direct {
            ResponseTarget::User(self.sender.clone())
        } else {
            ResponseTarget::Channel(self.target.clone())
        }
    }

    /// Get the channel type as a string.
    pub fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }
}

/// Destination of a reply: the originating channel or the originating user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ResponseTarget {
    Channel(String),
    User(String),
}

impl ResponseTarget {
    /// Identity passed to the transport when sending.
    pub fn destination(&self) -> &str {
        match self {
            Self::Channel(name) | Self::User(name) => name,
        }
    }
}

impl std::fmt::Display for ResponseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.destination())
    }
}

/// One outgoing line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Destination identity
    pub target: String,
    /// Line text
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_message_serialization() {
        let msg = ChannelMessage::new(ChannelType::Irc, "alice", "#lobby", "hi", false);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"channel_type\":\"irc\""));
        assert!(json.contains("\"sender\":\"alice\""));
        assert!(json.contains("\"is_direct\":false"));

        let parsed: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, msg.id);
        assert_eq!(parsed.trace_id, msg.trace_id);
    }

    #[test]
    fn test_new_assigns_unique_ids() {
        let a = ChannelMessage::new(ChannelType::Cli, "u", "cli", "x", true);
        let b = ChannelMessage::new(ChannelType::Cli, "u", "cli", "x", true);
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn test_response_target_channel() {
        let msg = ChannelMessage::new(ChannelType::Irc, "alice", "#lobby", "hey bot", false);
        assert_eq!(msg.response_target(), ResponseTarget::Channel("#lobby".into()));
        assert_eq!(msg.response_target().destination(), "#lobby");
    }

    #[test]
    fn test_response_target_direct() {
        let msg = ChannelMessage::new(ChannelType::Irc, "alice", "SteveBot", "psst", true);
        assert_eq!(msg.response_target(), ResponseTarget::User("alice".into()));
        assert_eq!(msg.response_target().to_string(), "alice");
    }

    #[test]
    fn test_channel_type_str() {
        assert_eq!(ChannelType::Irc.as_str(), "irc");
        assert_eq!(ChannelType::Cli.as_str(), "cli");
    }
}
