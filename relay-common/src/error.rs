//! Error types for the chat relay.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for relay components.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The text-generation service could not be reached
    #[error("External service error: {0}")]
    External(String),

    /// The text-generation service answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a timeout, looking through any added context.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Check if the generator round trip failed in transport.
    ///
    /// Covers unreachable hosts, timeouts and non-success statuses.
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::External(_) | Self::UpstreamStatus { .. } | Self::Timeout => true,
            Self::WithContext { source, .. } => source.is_transport_failure(),
            Self::Config(_) => false,
        }
    }
}
