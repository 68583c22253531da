//! Error types for Hatewatch.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use thiserror::Error;

/// Central error type for all Hatewatch operations.
#[derive(Debug, Error)]
pub enum HatewatchError {
    /// Hate speech classifier returned an error or unexpected response.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Response generator returned an error or unexpected response.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Discord API error from serenity.
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),

    /// Rate limited by an external API.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds to wait before retry.
        retry_after_ms: u64,
    },

    /// An external call did not finish in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// Name of the call that timed out.
        operation: &'static str,
        /// Configured limit in milliseconds.
        after_ms: u64,
    },

    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal state error (invalid action target, lock poisoning).
    #[error("Internal state error: {0}")]
    InternalState(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HatewatchError {
    /// Log error with full context using tracing.
    pub fn log_with_context(&self, context: &ErrorContext) {
        if self.is_critical() {
            tracing::error!(
                error = %self,
                request_id = %context.request_id,
                user_id = ?context.user_id,
                guild_id = ?context.guild_id,
                operation = %context.operation,
                "Critical error occurred"
            );
            return;
        }

        match self {
            Self::InternalState(_) => {}
            // Rate limits and timeouts are expected under load
            Self::RateLimited { .. } | Self::Timeout { .. } => {
                tracing::warn!(
                    error = %self,
                    request_id = %context.request_id,
                    user_id = ?context.user_id,
                    guild_id = ?context.guild_id,
                    operation = %context.operation,
                    "External call degraded"
                );
            }
            Self::Classifier(_) | Self::Generation(_) | Self::DiscordApi(_) | Self::Http(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    user_id = ?context.user_id,
                    guild_id = ?context.guild_id,
                    operation = %context.operation,
                    "External API error"
                );
            }
            Self::Config(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Configuration error"
                );
            }
            Self::Json(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    user_id = ?context.user_id,
                    guild_id = ?context.guild_id,
                    operation = %context.operation,
                    "Data processing error"
                );
            }
        }
    }

    /// Check if this error is critical and requires alerting.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::InternalState(_))
    }

    /// Get user-friendly error message (hides internal details).
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Classifier(_) => "Moderation service temporarily unavailable",
            Self::Generation(_) => "AI service temporarily unavailable",
            Self::DiscordApi(_) => "Discord service temporarily unavailable",
            Self::RateLimited { .. } => "Too many requests, please try again later",
            Self::Timeout { .. } => "The service took too long to respond",
            Self::Config(_) => "Service configuration error",
            Self::InternalState(_) => "Internal service error",
            Self::Http(_) => "Network error, please try again",
            Self::Json(_) => "Data format error",
        }
    }
}

/// Context information for error logging.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// User ID if available
    pub user_id: Option<u64>,
    /// Guild ID if available
    pub guild_id: Option<u64>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            guild_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_user_id(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_guild_id(mut self, guild_id: u64) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for Hatewatch operations.
pub type Result<T> = std::result::Result<T, HatewatchError>;
