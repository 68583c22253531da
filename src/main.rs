//! Hatewatch Discord bot entry point.

use std::sync::Arc;

use serenity::model::application::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hatewatch::classifier::HuggingFaceClassifier;
use hatewatch::commands::SlashCommandHandler;
use hatewatch::config::HatewatchConfig;
use hatewatch::discord::DiscordClient;
use hatewatch::error::{HatewatchError, Result};
use hatewatch::health::{spawn_health_server, HealthState};
use hatewatch::metrics::ModerationMetrics;
use hatewatch::models::IncomingMessage;
use hatewatch::policy::ModerationPolicy;
use hatewatch::responder::GeminiResponder;
use hatewatch::router::MessageRouter;
use hatewatch::tracker::OffenseTracker;

/// Main event handler for the bot.
struct HatewatchHandler {
    router: Arc<MessageRouter>,
    command_handler: Arc<SlashCommandHandler>,
}

#[serenity::async_trait]
impl EventHandler for HatewatchHandler {
    async fn message(&self, _ctx: Context, msg: Message) {
        // Ignore bot messages, including our own replies
        if msg.author.bot {
            return;
        }

        let incoming = IncomingMessage::from_discord(&msg);
        self.router.handle(&incoming).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = self.command_handler.handle_command(&ctx, &command).await {
                tracing::error!(error = %e, "Failed to handle slash command");
            }
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "Hatewatch bot connected");

        let commands = SlashCommandHandler::register_commands();
        if let Err(e) = serenity::all::Command::set_global_commands(&ctx.http, commands).await {
            tracing::error!(error = %e, "Failed to register slash commands");
        } else {
            tracing::info!("Slash commands registered");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides the default info level, e.g. RUST_LOG=hatewatch=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        built = env!("BUILD_TIMESTAMP"),
        commit = env!("GIT_COMMIT"),
        "Hatewatch bot starting..."
    );

    let config = HatewatchConfig::from_env()?;
    tracing::info!(
        classifier_model = %config.classifier_model,
        classifier_timeout_secs = config.classifier_timeout.as_secs(),
        generation_timeout_secs = config.generation_timeout.as_secs(),
        "Configuration loaded"
    );

    let tracker = Arc::new(OffenseTracker::new());
    let metrics = Arc::new(ModerationMetrics::new());

    spawn_health_server(
        config.health_port,
        HealthState {
            metrics: metrics.clone(),
            tracker: tracker.clone(),
        },
    );

    let classifier = Arc::new(HuggingFaceClassifier::new(
        &config.classifier_url,
        &config.classifier_model,
        config.hf_api_token.clone(),
        config.requests_per_minute,
    )?);
    tracing::info!(endpoint = classifier.endpoint(), "Classifier ready");

    let responder = Arc::new(GeminiResponder::with_rate_limit(
        config.gemini_api_key.clone(),
        config.generation,
        config.requests_per_minute,
    )?);

    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let executor = Arc::new(DiscordClient::new(http));

    let policy = ModerationPolicy::new(tracker.clone(), responder, config.generation_timeout);
    let router = Arc::new(MessageRouter::new(
        classifier,
        policy,
        executor,
        tracker.clone(),
        metrics.clone(),
        config.classifier_timeout,
    ));
    let command_handler = Arc::new(SlashCommandHandler::new(tracker, metrics));

    let handler = HatewatchHandler {
        router,
        command_handler,
    };

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| HatewatchError::DiscordApi(Box::new(e)))?;

    tracing::info!("Starting Discord client...");

    client
        .start()
        .await
        .map_err(|e| HatewatchError::DiscordApi(Box::new(e)))?;

    Ok(())
}
