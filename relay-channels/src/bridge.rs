//! Bridge between a chat transport and the responder.
//!
//! Inbound messages are processed one at a time: trigger check, clean,
//! generator round trip, segmentation, paced send back to the origin.

use crate::cli::CliChannel;
use crate::generator::{PollinationsClient, TextGenerator};
use crate::irc::IrcChannel;
use crate::message::ChannelMessage;
use crate::outbound::OutboundRouter;
use crate::responder::Responder;
use crate::segment::segment;
use crate::traits::Channel;
use anyhow::Result;
use relay_common::config::Config;
use relay_common::util::truncate_with_ellipsis;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Inbound queue depth between the transport and the processor.
const INBOUND_QUEUE: usize = 64;

/// Relay bridge.
pub struct RelayBridge<G = Box<dyn TextGenerator>> {
    responder: Responder<G>,
    outbound: Arc<OutboundRouter>,
    max_line_length: usize,
}

impl<G: TextGenerator + 'static> RelayBridge<G> {
    pub fn new(responder: Responder<G>, outbound: Arc<OutboundRouter>, max_line_length: usize) -> Self {
        Self {
            responder,
            outbound,
            max_line_length,
        }
    }

    pub fn responder(&self) -> &Responder<G> {
        &self.responder
    }

    /// Process an incoming message and send the reply, if any.
    ///
    /// A failed generator round trip is logged and produces no reply; it is
    /// not an error for the caller.
    pub async fn process(&self, message: ChannelMessage) -> Result<()> {
        if message.sender.eq_ignore_ascii_case(self.responder.nick()) {
            return Ok(());
        }

        if !self.responder.should_engage(&message) {
            tracing::trace!(sender = %message.sender, "Not addressed, ignoring");
            return Ok(());
        }

        let span = relay_common::channel_span!(
            message.channel_type_str(),
            message.trace_id,
            message.sender,
            target_name = %message.target
        );

        self.reply(message).instrument(span).await
    }

    async fn reply(&self, message: ChannelMessage) -> Result<()> {
        tracing::info!(
            direct = message.is_direct,
            text = %truncate_with_ellipsis(&message.text, 120),
            "Engaging"
        );

        let cleaned = self.responder.clean(&message.text);

        let reply = match self.responder.respond(&cleaned, &message.sender).await {
            Ok(reply) => reply,
            Err(e) if e.is_transport_failure() => {
                tracing::error!(
                    error = %e,
                    timeout = e.is_timeout(),
                    "Text generation failed, no reply sent"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if reply.is_empty() {
            tracing::warn!("Generator returned an empty reply");
            return Ok(());
        }

        let target = message.response_target();
        let result = self
            .outbound
            .send_chunks(
                message.channel_type,
                target.destination(),
                segment(&reply, self.max_line_length),
            )
            .await;

        if result.success {
            tracing::info!(
                target_name = %target,
                lines = result.delivered,
                "Reply sent"
            );
        } else {
            tracing::error!(
                target_name = %target,
                delivered = result.delivered,
                error = ?result.error,
                "Failed to send reply"
            );
        }

        Ok(())
    }

    /// Start a background processor that handles messages from a channel.
    ///
    /// Messages are handled strictly in arrival order, one round trip at a time.
    pub fn spawn_processor(
        bridge: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Relay bridge processor started");

            while let Some(message) = rx.recv().await {
                if let Err(e) = bridge.process(message).await {
                    tracing::error!(error = %e, "Failed to process message");
                }
            }

            tracing::info!("Relay bridge processor stopped");
        })
    }
}

/// Wire everything from configuration and run until the transport closes.
pub async fn start(config: &Config, use_cli: bool) -> Result<()> {
    let trigger = config.bot.compile_trigger();
    let generator: Box<dyn TextGenerator> =
        Box::new(PollinationsClient::from_config(&config.generator));
    let responder = Responder::from_config(generator, &config.irc.nick, &config.bot, trigger);

    let mut channel: Box<dyn Channel> = if use_cli {
        Box::new(CliChannel::new(&config.irc.nick))
    } else {
        Box::new(IrcChannel::new(config.irc.clone()))
    };
    channel.init().await?;
    let channel: Arc<dyn Channel> = Arc::from(channel);

    let outbound = Arc::new(
        OutboundRouter::new(channel.clone())
            .with_interval(Duration::from_millis(config.irc.send_interval_ms)),
    );
    let bridge = Arc::new(RelayBridge::new(
        responder,
        outbound,
        config.irc.max_line_length,
    ));

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let processor = RelayBridge::spawn_processor(bridge, rx);

    tracing::info!(channel = channel.name(), "Relay running");

    let listened = tokio::select! {
        result = channel.listen(tx) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };

    // The sender is gone now; let in-flight replies finish.
    if let Err(e) = processor.await {
        tracing::error!(error = %e, "Relay bridge processor panicked");
    }

    if let Err(e) = channel.shutdown().await {
        tracing::warn!(error = %e, "Channel shutdown failed");
    }

    listened.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChannelType, OutgoingMessage};
    use crate::traits::ChannelResult;
    use async_trait::async_trait;
    use relay_common::Error;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        replies: Mutex<Vec<relay_common::Result<String>>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<relay_common::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> relay_common::Result<String> {
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[derive(Default)]
    struct MockChannel {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn init(&mut self) -> ChannelResult<()> {
            Ok(())
        }

        async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
            self.sent.lock().unwrap().push(message);
            Ok("ok".into())
        }

        async fn listen(&self, _inbound: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
            Ok(())
        }

        async fn health_check(&self) -> ChannelResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> ChannelResult<()> {
            Ok(())
        }
    }

    fn bridge(
        replies: Vec<relay_common::Result<String>>,
        max_line_length: usize,
    ) -> (RelayBridge<ScriptedGenerator>, Arc<MockChannel>) {
        let channel = Arc::new(MockChannel::default());
        let outbound =
            Arc::new(OutboundRouter::new(channel.clone()).with_interval(Duration::ZERO));
        let responder = Responder::new(ScriptedGenerator::new(replies), "Steve", "Be nice.", None);
        (RelayBridge::new(responder, outbound, max_line_length), channel)
    }

    fn msg(sender: &str, target: &str, text: &str, is_direct: bool) -> ChannelMessage {
        ChannelMessage::new(ChannelType::Irc, sender, target, text, is_direct)
    }

    #[tokio::test]
    async fn test_reply_goes_to_channel() {
        let (bridge, channel) = bridge(vec![Ok("Assistant: hi alice".into())], 400);

        bridge.process(msg("alice", "#lobby", "Steve: hello", false)).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, "#lobby");
        assert_eq!(sent[0].text, "hi alice");
    }

    #[tokio::test]
    async fn test_direct_reply_goes_to_sender() {
        let (bridge, channel) = bridge(vec![Ok("sure".into())], 400);

        bridge.process(msg("alice", "Steve", "help me", true)).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent[0].target, "alice");
    }

    #[tokio::test]
    async fn test_unaddressed_message_ignored() {
        let (bridge, channel) = bridge(vec![], 400);

        bridge.process(msg("alice", "#lobby", "just chatting", false)).await.unwrap();

        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(bridge.responder().history_len().await, 1);
    }

    #[tokio::test]
    async fn test_own_message_ignored() {
        let (bridge, channel) = bridge(vec![], 400);

        bridge.process(msg("steve", "#lobby", "Steve here", false)).await.unwrap();

        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generator_failure_sends_nothing() {
        let (bridge, channel) = bridge(vec![Err(Error::Timeout)], 400);

        let result = bridge.process(msg("alice", "#lobby", "steve?", false)).await;

        assert!(result.is_ok());
        assert!(channel.sent.lock().unwrap().is_empty());
        // The user turn stays in history.
        assert_eq!(bridge.responder().history_len().await, 2);
    }

    #[tokio::test]
    async fn test_long_reply_is_segmented() {
        let reply = "First sentence here. Second sentence here. Third one.";
        let (bridge, channel) = bridge(vec![Ok(reply.into())], 25);

        bridge.process(msg("alice", "#lobby", "steve, talk", false)).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        let texts: Vec<&str> = sent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["First sentence here.", "Second sentence here.", "Third one."]
        );
    }

    #[tokio::test]
    async fn test_processor_handles_messages_in_order() {
        let (bridge, channel) = bridge(vec![Ok("one".into()), Ok("two".into())], 400);
        let bridge = Arc::new(bridge);

        let (tx, rx) = mpsc::channel(4);
        let handle = RelayBridge::spawn_processor(bridge.clone(), rx);

        tx.send(msg("alice", "#lobby", "steve 1", false)).await.unwrap();
        tx.send(msg("bob", "#lobby", "steve 2", false)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let sent = channel.sent.lock().unwrap();
        let texts: Vec<&str> = sent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);

        let snapshot = bridge.responder().snapshot().await;
        assert!(snapshot.contains("User: alice: steve 1\nAssistant: one\nUser: bob: steve 2\nAssistant: two\n"));
    }
}
