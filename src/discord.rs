//! Discord client for moderation actions.
//!
//! Implements [`ActionExecutor`] on top of serenity's REST client.

use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use crate::error::{HatewatchError, Result};
use crate::executor::ActionExecutor;

/// Discord rejects message content longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const AUDIT_REASON: &str = "Hate speech";

/// Discord client for moderation actions.
pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ActionExecutor for DiscordClient {
    async fn send_text(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        let body = serde_json::json!({ "content": truncate_for_discord(content) });
        self.http
            .send_message(channel_id, vec![], &body)
            .await
            .map_err(|e| HatewatchError::DiscordApi(Box::new(e)))?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        self.http
            .delete_message(channel_id, message_id, Some(AUDIT_REASON))
            .await
            .map_err(|e| HatewatchError::DiscordApi(Box::new(e)))
    }

    async fn remove_user(&self, guild_id: GuildId, user_id: UserId) -> Result<()> {
        self.http
            .ban_user(guild_id, user_id, 0, Some(AUDIT_REASON))
            .await
            .map_err(|e| HatewatchError::DiscordApi(Box::new(e)))?;

        tracing::info!(guild_id = %guild_id, user_id = %user_id, "User banned");

        // A failure here leaves the user banned until a moderator lifts it.
        if let Err(e) = self
            .http
            .remove_ban(guild_id, user_id, Some(AUDIT_REASON))
            .await
        {
            tracing::error!(
                guild_id = %guild_id,
                user_id = %user_id,
                error = %e,
                "Unban after kick failed, user remains banned"
            );
            return Err(HatewatchError::DiscordApi(Box::new(e)));
        }

        tracing::info!(guild_id = %guild_id, user_id = %user_id, "User unbanned");
        Ok(())
    }
}

/// Cut `content` to Discord's message length limit on a char boundary.
pub fn truncate_for_discord(content: &str) -> &str {
    match content.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}


#[cfg(test)]
mod property_tests {
    use crate::discord::{truncate_for_discord, MAX_MESSAGE_CHARS};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Truncation yields a prefix no longer than the limit.
        #[test]
        fn prop_truncation_is_bounded_prefix(content in "\\PC{0,2100}") {
            let cut = truncate_for_discord(&content);
            prop_assert!(cut.chars().count() <= MAX_MESSAGE_CHARS);
            prop_assert!(content.starts_with(cut));
        }
    }
}
