//! Relay Common - Shared configuration, errors, and logging for the chat relay.
//!
//! This crate provides:
//! - Configuration types, file loading and environment overrides
//! - The relay error type
//! - Logging setup and structured logging helpers
//! - Small text utilities used in log output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{BotConfig, Config, GeneratorConfig, IrcConfig, ObservabilityConfig};
pub use error::{Error, Result};
