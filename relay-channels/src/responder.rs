//! Responder: decides when to answer, cleans the inbound line, runs the
//! generator round trip and sanitizes what comes back.

use crate::context::{ContextEntry, ConversationWindow};
use crate::generator::TextGenerator;
use crate::message::ChannelMessage;
use regex::Regex;
use relay_common::config::BotConfig;
use relay_common::Result;
use std::sync::LazyLock;
use tokio::sync::Mutex;

/// Substituted when a message is empty after removing the salutation.
pub const FILLER_GREETING: &str = "Hello!";

/// Role labels the generator sometimes echoes at the start of a reply.
const REPLY_PREFIXES: &[&str] = &["Assistant: ", "Bot: ", "AI: "];

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Whether an inbound line deserves a reply.
///
/// Direct messages always do. Channel messages do when they mention `nick`
/// (case-insensitive) or match the trigger pattern.
pub fn should_engage(message: &str, nick: &str, directed: bool, trigger: Option<&Regex>) -> bool {
    if directed {
        return true;
    }

    if message.to_lowercase().contains(&nick.to_lowercase()) {
        return true;
    }

    trigger.is_some_and(|pattern| pattern.is_match(message))
}

/// Pattern matching `"<nick>:"` or `"<nick>,"` salutations plus trailing whitespace.
pub fn mention_pattern(nick: &str) -> Regex {
    Regex::new(&format!(r"(?i){}[,:]\s*", regex::escape(nick)))
        .expect("escaped nick is a valid pattern")
}

/// Remove salutations addressed to `nick`, falling back to [`FILLER_GREETING`].
pub fn clean(message: &str, nick: &str) -> String {
    clean_with(message, &mention_pattern(nick), FILLER_GREETING)
}

fn clean_with(message: &str, mention: &Regex, filler: &str) -> String {
    let cleaned = mention.replace_all(message, "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        filler.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Tidy raw generator output into a single line of text.
///
/// Strips one leading role label, markup tags, and collapses whitespace.
pub fn sanitize(raw: &str) -> String {
    let mut reply = raw.trim_start();

    for prefix in REPLY_PREFIXES {
        if let Some(stripped) = reply.strip_prefix(prefix) {
            reply = stripped;
            break;
        }
    }

    let reply = MARKUP_TAG.replace_all(reply, "");
    let reply = WHITESPACE_RUN.replace_all(&reply, " ");
    reply.trim().to_string()
}

/// Owns the conversation and drives generator round trips.
pub struct Responder<G> {
    generator: G,
    window: Mutex<ConversationWindow>,
    nick: String,
    mention: Regex,
    trigger: Option<Regex>,
    filler: String,
}

impl<G: TextGenerator> Responder<G> {
    /// Create a responder with a default-sized window.
    pub fn new(generator: G, nick: impl Into<String>, persona: &str, trigger: Option<Regex>) -> Self {
        Self::with_window(generator, nick, ConversationWindow::initialize(persona), trigger)
    }

    /// Create a responder from bot configuration. The trigger is compiled by the caller.
    pub fn from_config(
        generator: G,
        nick: impl Into<String>,
        config: &BotConfig,
        trigger: Option<Regex>,
    ) -> Self {
        let window = ConversationWindow::with_capacity(&config.persona, config.history_limit);
        let mut responder = Self::with_window(generator, nick, window, trigger);
        responder.filler = config.filler_greeting.clone();
        responder
    }

    fn with_window(
        generator: G,
        nick: impl Into<String>,
        window: ConversationWindow,
        trigger: Option<Regex>,
    ) -> Self {
        let nick = nick.into();
        Self {
            generator,
            window: Mutex::new(window),
            mention: mention_pattern(&nick),
            nick,
            trigger,
            filler: FILLER_GREETING.to_string(),
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Whether `message` should get a reply.
    pub fn should_engage(&self, message: &ChannelMessage) -> bool {
        should_engage(
            &message.text,
            &self.nick,
            message.is_direct,
            self.trigger.as_ref(),
        )
    }

    /// Strip salutations to this bot from `text`.
    pub fn clean(&self, text: &str) -> String {
        clean_with(text, &self.mention, &self.filler)
    }

    /// Run one round trip: record the user turn, ask the generator, record
    /// and return the sanitized reply.
    ///
    /// The window lock is held for the whole round trip so that concurrent
    /// callers never interleave their turns. On failure the user turn stays
    /// in the history.
    pub async fn respond(&self, cleaned: &str, from: &str) -> Result<String> {
        let mut window = self.window.lock().await;

        window.append(ContextEntry::user(from, cleaned));
        let prompt = window.serialize();

        tracing::debug!(
            history = window.len(),
            prompt_bytes = prompt.len(),
            "Requesting generation"
        );

        let raw = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| e.with_context(format!("generating reply for {from}")))?;
        let reply = sanitize(&raw);

        window.append(ContextEntry::assistant(reply.clone()));
        Ok(reply)
    }

    /// Current prompt rendering of the history, without the pending turn.
    pub async fn snapshot(&self) -> String {
        self.window.lock().await.serialize()
    }

    /// Number of entries currently in the window.
    pub async fn history_len(&self) -> usize {
        self.window.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChannelType;
    use async_trait::async_trait;
    use relay_common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Generator returning scripted replies and recording prompts.
    struct ScriptedGenerator {
        replies: StdMutex<Vec<Result<String>>>,
        prompts: StdMutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: StdMutex::new(replies),
                prompts: StdMutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn message(text: &str, is_direct: bool) -> ChannelMessage {
        ChannelMessage::new(ChannelType::Irc, "alice", "#lobby", text, is_direct)
    }

    #[test]
    fn test_should_engage_on_name_mention() {
        assert!(should_engage("anyone seen steve?", "Steve", false, None));
        assert!(should_engage("STEVE!", "Steve", false, None));
        assert!(!should_engage("just chatting", "Steve", false, None));
    }

    #[test]
    fn test_should_engage_when_directed() {
        assert!(should_engage("just chatting", "Steve", true, None));
    }

    #[test]
    fn test_should_engage_on_trigger() {
        let trigger = Regex::new(r"^!").unwrap();
        assert!(should_engage("!weather", "Steve", false, Some(&trigger)));
        assert!(!should_engage("weather!", "Steve", false, Some(&trigger)));
    }

    #[test]
    fn test_clean_strips_salutation() {
        assert_eq!(clean("Steve: hello there", "Steve"), "hello there");
        assert_eq!(clean("steve,   how are you", "Steve"), "how are you");
        assert_eq!(clean("ok thanks STEVE: bye", "Steve"), "ok thanks bye");
    }

    #[test]
    fn test_clean_empty_becomes_filler() {
        assert_eq!(clean("Steve,", "Steve"), FILLER_GREETING);
        assert_eq!(clean("   ", "Steve"), FILLER_GREETING);
    }

    #[test]
    fn test_clean_keeps_plain_mentions() {
        assert_eq!(clean("is Steve around?", "Steve"), "is Steve around?");
    }

    #[test]
    fn test_clean_escapes_nick() {
        assert_eq!(clean("bot|away: ping", "bot|away"), "ping");
        assert_eq!(clean("bot: ping", "bot|away"), "bot: ping");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Assistant: <b>hi</b>   there"), "hi there");
        assert_eq!(sanitize("  Bot: line one\n\nline two  "), "line one line two");
        assert_eq!(sanitize("AI: AI: twice"), "AI: twice");
        assert_eq!(sanitize("plain"), "plain");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_prefix_must_lead() {
        assert_eq!(sanitize("Well, Assistant: no"), "Well, Assistant: no");
    }

    #[tokio::test]
    async fn test_respond_records_both_turns() {
        let generator = ScriptedGenerator::new(vec![Ok("Assistant: <i>hey</i> bob".into())]);
        let responder = Responder::new(generator, "Steve", "Be nice.", None);

        let reply = responder.respond("hello", "bob").await.unwrap();
        assert_eq!(reply, "hey bob");
        assert_eq!(responder.history_len().await, 3);

        let prompts = responder.generator.prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec!["System: Be nice.\nUser: bob: hello\nAssistant: "]);

        assert_eq!(
            responder.snapshot().await,
            "System: Be nice.\nUser: bob: hello\nAssistant: hey bob\nAssistant: "
        );
    }

    #[tokio::test]
    async fn test_failed_round_trip_keeps_user_turn() {
        let generator = ScriptedGenerator::new(vec![
            Err(Error::UpstreamStatus {
                status: 500,
                body: "boom".into(),
            }),
            Ok("second".into()),
        ]);
        let responder = Responder::new(generator, "Steve", "", None);

        let err = responder.respond("first try", "bob").await.unwrap_err();
        assert!(err.is_transport_failure());
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "generating reply for bob: Upstream returned status 500: boom"
        );
        assert_eq!(responder.history_len().await, 1);

        let reply = responder.respond("again", "bob").await.unwrap();
        assert_eq!(reply, "second");

        let prompts = responder.generator.prompts.lock().unwrap().clone();
        assert_eq!(
            prompts[1],
            "User: bob: first try\nUser: bob: again\nAssistant: "
        );
        assert_eq!(responder.generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_config_uses_history_limit_and_filler() {
        let config = BotConfig {
            persona: "P".into(),
            trigger_pattern: None,
            history_limit: 3,
            filler_greeting: "Hi!".into(),
        };
        let replies = (0..5).map(|i| Ok(format!("r{i}"))).collect();
        let responder =
            Responder::from_config(ScriptedGenerator::new(replies), "Steve", &config, None);

        assert_eq!(responder.clean("Steve:"), "Hi!");
        for i in 0..5 {
            responder.respond(&format!("m{i}"), "bob").await.unwrap();
        }
        assert_eq!(responder.history_len().await, 3);
        assert_eq!(
            responder.snapshot().await,
            "System: P\nUser: bob: m4\nAssistant: r4\nAssistant: "
        );
    }

    #[tokio::test]
    async fn test_responder_should_engage() {
        let trigger = Regex::new("(?i)^!ask").unwrap();
        let responder = Responder::new(ScriptedGenerator::new(vec![]), "Steve", "", Some(trigger));

        assert!(responder.should_engage(&message("hey steve", false)));
        assert!(responder.should_engage(&message("!ASK about rust", false)));
        assert!(responder.should_engage(&message("whatever", true)));
        assert!(!responder.should_engage(&message("whatever", false)));
    }
}
