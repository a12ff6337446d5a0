//! Configuration management for the chat relay.
//!
//! The relay reads an optional JSON file at `~/.chatrelay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `IRC_SERVER` → irc.server
//! - `IRC_PORT` → irc.port
//! - `IRC_CHANNEL` → irc.channel
//! - `IRC_NICK` → irc.nick
//! - `IRC_BOTNAME` → irc.real_name
//! - `BOT_PERSONA` → bot.persona
//! - `TRIGGER_PATTERN` → bot.trigger_pattern
//! - `GENERATOR_ENDPOINT` → generator.endpoint
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format
//!
//! An empty environment variable counts as unset.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".chatrelay"),
        |dirs| dirs.home_dir().join(".chatrelay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// IRC Configuration
// ============================================================================

/// Chat network connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server host name
    #[serde(default = "default_server")]
    pub server: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Channel joined after registration
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Bot nick
    #[serde(default = "default_nick")]
    pub nick: String,

    /// Real name sent with USER
    #[serde(default = "default_real_name")]
    pub real_name: String,

    /// Connect over TLS
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Verify the server certificate. Disable only for self-signed servers.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Maximum bytes of text per outgoing line, leaving room for protocol overhead
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Delay between consecutive outgoing lines in milliseconds
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Pause before reconnecting after the connection drops, in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            channel: default_channel(),
            nick: default_nick(),
            real_name: default_real_name(),
            use_tls: true,
            verify_tls: true,
            max_line_length: default_max_line_length(),
            send_interval_ms: default_send_interval_ms(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl IrcConfig {
    /// `host:port` for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

fn default_server() -> String {
    "irc.h4ks.com".into()
}

fn default_port() -> u16 {
    6697
}

fn default_channel() -> String {
    "#lobby".into()
}

fn default_nick() -> String {
    "SteveBot".into()
}

fn default_real_name() -> String {
    "Very cool and helpful bot".into()
}

fn default_true() -> bool {
    true
}

fn default_max_line_length() -> usize {
    400
}

fn default_send_interval_ms() -> u64 {
    500
}

fn default_reconnect_delay_secs() -> u64 {
    60
}

// ============================================================================
// Bot Behaviour Configuration
// ============================================================================

/// Persona, trigger and history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Fixed system instructions. Empty means no persona.
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Regular expression that makes the bot answer channel messages
    /// that do not mention it.
    #[serde(default = "default_trigger_pattern")]
    pub trigger_pattern: Option<String>,

    /// Maximum entries kept in the conversation window, persona included
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Text sent to the generator when a cleaned message is empty
    #[serde(default = "default_filler_greeting")]
    pub filler_greeting: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            trigger_pattern: default_trigger_pattern(),
            history_limit: default_history_limit(),
            filler_greeting: default_filler_greeting(),
        }
    }
}

impl BotConfig {
    /// Compile the trigger pattern.
    ///
    /// An invalid pattern disables the trigger instead of failing startup.
    pub fn compile_trigger(&self) -> Option<Regex> {
        let source = self.trigger_pattern.as_deref().filter(|p| !p.is_empty())?;
        match Regex::new(source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(
                    pattern = %source,
                    error = %e,
                    "Invalid trigger pattern, trigger disabled"
                );
                None
            }
        }
    }
}

fn default_persona() -> String {
    "You are a helpful and friendly IRC bot named Steve. Keep responses concise and engaging. \
     You have a casual, slightly witty personality. Always be respectful and helpful."
        .into()
}

fn default_trigger_pattern() -> Option<String> {
    Some("(?i)(steve|^!)".into())
}

fn default_history_limit() -> usize {
    19
}

fn default_filler_greeting() -> String {
    "Hello!".into()
}

// ============================================================================
// Generator Configuration
// ============================================================================

/// Text-generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL; the encoded prompt is appended as the last path segment
    #[serde(default = "default_generator_endpoint")]
    pub endpoint: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generator_endpoint(),
            timeout_secs: default_generator_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_generator_endpoint() -> String {
    "https://text.pollinations.ai".into()
}

fn default_generator_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub irc: IrcConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration from `path` (or the default path) with environment
    /// variable overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(server) = var("IRC_SERVER") {
            self.irc.server = server;
        }
        if let Some(port) = var("IRC_PORT") {
            match port.parse() {
                Ok(p) => self.irc.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparsable IRC_PORT"),
            }
        }
        if let Some(channel) = var("IRC_CHANNEL") {
            self.irc.channel = channel;
        }
        if let Some(nick) = var("IRC_NICK") {
            self.irc.nick = nick;
        }
        if let Some(real_name) = var("IRC_BOTNAME") {
            self.irc.real_name = real_name;
        }
        if let Some(persona) = var("BOT_PERSONA") {
            self.bot.persona = persona;
        }
        if let Some(pattern) = var("TRIGGER_PATTERN") {
            self.bot.trigger_pattern = Some(pattern);
        }
        if let Some(endpoint) = var("GENERATOR_ENDPOINT") {
            self.generator.endpoint = endpoint;
        }
        if let Some(level) = var("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = var("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Check the values the relay cannot run without.
    pub fn validate(&self) -> crate::Result<()> {
        if self.irc.server.trim().is_empty() {
            return Err(Error::Config("irc.server must not be empty".into()));
        }
        if self.irc.port == 0 {
            return Err(Error::Config("irc.port must not be 0".into()));
        }
        if self.irc.nick.trim().is_empty() || self.irc.nick.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "irc.nick is not a valid nick: {:?}",
                self.irc.nick
            )));
        }
        if !self.irc.channel.starts_with('#') && !self.irc.channel.starts_with('&') {
            return Err(Error::Config(format!(
                "irc.channel must start with '#' or '&': {:?}",
                self.irc.channel
            )));
        }
        if self.irc.max_line_length == 0 {
            return Err(Error::Config("irc.max_line_length must be positive".into()));
        }
        let persona_slots = usize::from(!self.bot.persona.is_empty());
        if self.bot.history_limit <= persona_slots {
            return Err(Error::Config(format!(
                "bot.history_limit must leave room for at least one turn (got {})",
                self.bot.history_limit
            )));
        }
        Ok(())
    }
}
