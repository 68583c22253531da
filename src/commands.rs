//! Command surface: `/start`, `/help` and `/hatecount`.
//!
//! Commands never go through moderation. They arrive either as a text
//! message holding nothing but the command, or as a Discord slash command
//! interaction; both produce the same replies.

use std::sync::Arc;

use serenity::all::{
    CommandInteraction, Context, CreateCommand, CreateInteractionResponse,
    CreateInteractionResponseMessage,
};
use serenity::model::id::UserId;

use crate::error::{HatewatchError, Result};
use crate::metrics::ModerationMetrics;
use crate::tracker::OffenseTracker;

/// Static help text.
pub const HELP_TEXT: &str = "I watch this chat for hate speech.\n\
    • Messages classified as hate speech are answered, counted and deleted.\n\
    • A third offense earns a final warning; the fourth gets you kicked.\n\
    • Start a message with `bot ` to chat with me.\n\
    • `/hatecount` shows how many hate messages you have sent.";

/// A recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    HateCount,
}

impl Command {
    pub const ALL: [Command; 3] = [Command::Start, Command::Help, Command::HateCount];

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::HateCount => "hatecount",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Start => "Say hello to the bot",
            Self::Help => "Show what the bot does",
            Self::HateCount => "Show how many hate messages you have sent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Build the reply for `user_id`. Only reads the tracker.
    pub fn reply(self, user_id: UserId, user_name: &str, tracker: &OffenseTracker) -> String {
        match self {
            Self::Start => format!("Hi <@{}>!", user_id),
            Self::Help => HELP_TEXT.to_string(),
            Self::HateCount => format!(
                "{}, you have sent {} hate messages.",
                user_name,
                tracker.get(user_id)
            ),
        }
    }
}

/// Longest command name Discord and other chat transports accept.
const MAX_COMMAND_NAME_LEN: usize = 32;

impl Command {
    /// Parse a text message that consists of exactly one known command,
    /// written `/name` or `/name@bot`.
    ///
    /// Anything else is not a command and goes through moderation. That
    /// includes unknown names, a bare `/`, malformed tokens and known
    /// commands followed by more text.
    ///
    /// ```
    /// use hatewatch::commands::Command;
    ///
    /// assert_eq!(Command::parse_text("/help"), Some(Command::Help));
    /// assert_eq!(Command::parse_text("/help me out"), None);
    /// assert_eq!(Command::parse_text("hello"), None);
    /// ```
    pub fn parse_text(text: &str) -> Option<Self> {
        let token = text.trim_end().strip_prefix('/')?;
        let (name, bot) = match token.split_once('@') {
            Some((name, bot)) => (name, Some(bot)),
            None => (token, None),
        };

        if !is_command_word(name) || !bot.map_or(true, is_command_word) {
            return None;
        }
        Self::from_name(name)
    }
}

fn is_command_word(word: &str) -> bool {
    !word.is_empty()
        && word.len() <= MAX_COMMAND_NAME_LEN
        && word.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Slash command handler.
pub struct SlashCommandHandler {
    tracker: Arc<OffenseTracker>,
    metrics: Arc<ModerationMetrics>,
}

impl SlashCommandHandler {
    pub fn new(tracker: Arc<OffenseTracker>, metrics: Arc<ModerationMetrics>) -> Self {
        Self { tracker, metrics }
    }

    /// Register all slash commands with Discord.
    pub fn register_commands() -> Vec<CreateCommand> {
        Command::ALL
            .into_iter()
            .map(|c| CreateCommand::new(c.name()).description(c.description()))
            .collect()
    }

    /// Handle an incoming slash command interaction.
    pub async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let Some(known) = Command::from_name(&command.data.name) else {
            return self.respond_message(ctx, command, "❌ Unknown command.").await;
        };

        self.metrics.record_command();

        let user = &command.user;
        let user_name = user.global_name.as_deref().unwrap_or(&user.name);
        let reply = known.reply(user.id, user_name, &self.tracker);

        tracing::debug!(command = known.name(), user_id = %user.id, "Slash command handled");

        self.respond_message(ctx, command, &reply).await
    }

    async fn respond_message(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        content: &str,
    ) -> Result<()> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(content),
        );

        match command.create_response(&ctx.http, response).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Discord may timeout or another instance may respond first
                if e.to_string().contains("already been acknowledged") {
                    Ok(())
                } else {
                    Err(HatewatchError::DiscordApi(Box::new(e)))
                }
            }
        }
    }
}
