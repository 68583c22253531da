//! Core data models for Hatewatch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use sha2::{Digest, Sha256};

use crate::error::ErrorContext;

/// Literal prefix marking a message as addressed to the bot.
pub const BOT_PREFIX: &str = "bot ";

/// Label the classifier uses for hate speech. Every other label is negative.
pub const HATE_LABEL: &str = "hate";

/// Transport-neutral view of an inbound chat message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    /// Display name used in replies (global name, else username).
    pub author_name: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Build from a serenity gateway message.
    pub fn from_discord(message: &Message) -> Self {
        let author_name = message
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| message.author.name.clone());

        Self {
            guild_id: message.guild_id,
            channel_id: message.channel_id,
            message_id: message.id,
            author_id: message.author.id,
            author_name,
            content: message.content.clone(),
            received_at: Utc::now(),
        }
    }

    /// Split the message into the text to moderate and whether it was
    /// addressed to the bot.
    pub fn addressed(&self) -> Addressed<'_> {
        Addressed::parse(&self.content)
    }

    /// Error context for `operation` on this message, keyed by message id.
    pub fn error_context(&self, operation: &str) -> ErrorContext {
        let context = ErrorContext::new(operation)
            .with_request_id(self.message_id.to_string())
            .with_user_id(self.author_id.get());
        match self.guild_id {
            Some(guild_id) => context.with_guild_id(guild_id.get()),
            None => context,
        }
    }

    /// Time since the gateway delivered this message.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.received_at).to_std().unwrap_or_default()
    }
}

/// Message text after address-to-bot prefix handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressed<'a> {
    /// Whether the text started with [`BOT_PREFIX`].
    pub to_bot: bool,
    /// Text with the prefix removed.
    pub text: &'a str,
}

impl<'a> Addressed<'a> {
    /// Strip the literal `"bot "` prefix if present.
    ///
    /// ```
    /// use hatewatch::models::Addressed;
    ///
    /// let addressed = Addressed::parse("bot hello");
    /// assert!(addressed.to_bot);
    /// assert_eq!(addressed.text, "hello");
    ///
    /// let plain = Addressed::parse("hello");
    /// assert!(!plain.to_bot);
    /// assert_eq!(plain.text, "hello");
    /// ```
    pub fn parse(content: &'a str) -> Self {
        match content.strip_prefix(BOT_PREFIX) {
            Some(text) => Self { to_bot: true, text },
            None => Self {
                to_bot: false,
                text: content,
            },
        }
    }
}

/// Binary hate speech label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Hate,
    NotHate,
}

impl Label {
    /// Map a raw classifier label onto the closed label set.
    pub fn from_raw(label: &str) -> Self {
        if label == HATE_LABEL {
            Label::Hate
        } else {
            Label::NotHate
        }
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Confidence reported by the classifier, when available.
    pub score: Option<f32>,
}

impl Classification {
    pub fn hate(score: Option<f32>) -> Self {
        Self {
            label: Label::Hate,
            score,
        }
    }

    pub fn not_hate(score: Option<f32>) -> Self {
        Self {
            label: Label::NotHate,
            score,
        }
    }

    /// The fail-open outcome used when the classifier is unavailable.
    pub fn fail_open() -> Self {
        Self::not_hate(None)
    }

    pub fn is_hate(&self) -> bool {
        self.label == Label::Hate
    }
}

/// Hash content using SHA-256 (first 16 hex chars).
///
/// Used to reference offending messages in logs without storing their text.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}


#[cfg(test)]
mod property_tests {
    use crate::models::{Addressed, BOT_PREFIX};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Prefixing any text with "bot " marks it addressed and recovers the text.
        #[test]
        fn prop_prefix_roundtrip(text in "\\PC{0,80}") {
            let content = format!("{}{}", BOT_PREFIX, text);
            let addressed = Addressed::parse(&content);
            prop_assert!(addressed.to_bot);
            prop_assert_eq!(addressed.text, text.as_str());
        }

        /// Text not starting with the prefix passes through untouched.
        #[test]
        fn prop_unprefixed_untouched(text in "[a-zA-Z0-9 ]{0,80}".prop_filter("no prefix", |s| !s.starts_with("bot "))) {
            let addressed = Addressed::parse(&text);
            prop_assert!(!addressed.to_bot);
            prop_assert_eq!(addressed.text, text.as_str());
        }
    }
}
