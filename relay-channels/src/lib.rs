//! Relay Channels - IRC chat relay backed by a text-generation service.
//!
//! The relay listens on a channel, decides which lines deserve a reply,
//! forwards a bounded conversation window to the generator and sends the
//! reply back, split to fit the line limit.
//!
//! ## Architecture
//!
//! ```text
//! IRC → IrcChannel → mpsc → RelayBridge → Responder → TextGenerator
//!                                ↓             ↓
//! IRC ←── send ←── OutboundRouter ←── segment(reply)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bridge;
pub mod cli;
pub mod context;
pub mod generator;
pub mod irc;
pub mod message;
pub mod outbound;
pub mod responder;
pub mod segment;
pub mod traits;

// Re-export commonly used types
pub use bridge::{start, RelayBridge};
pub use cli::CliChannel;
pub use context::{ContextEntry, ConversationWindow, Role};
pub use generator::{PollinationsClient, TextGenerator};
pub use irc::IrcChannel;
pub use message::{ChannelMessage, ChannelType, OutgoingMessage, ResponseTarget};
pub use outbound::{OutboundRouter, SendResult};
pub use responder::{clean, sanitize, should_engage, Responder};
pub use segment::{segment, Segments};
pub use traits::{Channel, ChannelError, ChannelResult};
