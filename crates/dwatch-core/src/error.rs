//! Error types for the domain watch system
//!
//! This module defines all error types used throughout the crate.
//!
//! The variants follow the failure categories the engine distinguishes:
//! input validation, access policy, lookup provider failures, storage
//! failures and channel delivery failures. Provider failures are recovered
//! per domain; storage failures abort the operation that hit them.

use thiserror::Error;

/// Result type alias for domain watch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the domain watch system
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed domain name, id or settings value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Mutation attempted while the monitor runs read-only
    #[error("Read-only mode: {0}")]
    ReadOnly(String),

    /// Lookup provider has no API credentials configured
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Lookup provider could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Lookup provider rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Lookup provider throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Lookup provider rejected the domain as invalid
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Record or domain not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lookup provider failed on its side
    #[error("Provider server error: {0}")]
    Server(String),

    /// Store gateway failure
    #[error("Store error: {0}")]
    Store(String),

    /// Filesystem errors (file-backed store)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Notification channel failure
    #[error("Channel error ({channel}): {message}")]
    Channel {
        /// Channel key
        channel: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a read-only error
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    /// Create a missing credentials error
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a channel delivery error
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// HTTP-status-like code for the calling layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::ReadOnly(_) | Self::MissingCredentials(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 422,
            Self::RateLimited(_) => 429,
            Self::Authentication(_) => 401,
            Self::Network(_) | Self::Channel { .. } => 502,
            Self::Server(_) => 503,
            Self::Store(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => 500,
        }
    }

    /// Whether this error came from the lookup provider
    ///
    /// Provider errors are recorded on the domain and never abort a sweep.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Authentication(_)
                | Self::RateLimited(_)
                | Self::Validation(_)
                | Self::NotFound(_)
                | Self::Server(_)
        )
    }

    /// Whether the operation was rejected before any I/O
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::ReadOnly(_) | Self::MissingCredentials(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
