//! Conversational replies generated by Gemini.
//!
//! One generation call serves both reply styles; the [`PromptTemplate`]
//! selects the system instruction and shapes the user prompt.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter as GovRateLimiter};
use serde::{Deserialize, Serialize};
use serenity::async_trait;

use crate::config::GenerationSettings;
use crate::error::{HatewatchError, Result};

/// Gemini 2.0 Flash API endpoint.
const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// System instruction for ordinary replies.
const CONVERSATION_INSTRUCTION: &str =
    "You are a conversational bot. If you get insulted, insult back creatively.";

/// System instruction for replies to hate speech.
const ADMONISH_INSTRUCTION: &str = "You are a conversational bot.";

/// Which kind of reply to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Chat back to a message addressed to the bot.
    Conversation,
    /// Scold the author of a hateful message.
    Admonish,
}

impl PromptTemplate {
    pub fn system_instruction(self) -> &'static str {
        match self {
            Self::Conversation => CONVERSATION_INSTRUCTION,
            Self::Admonish => ADMONISH_INSTRUCTION,
        }
    }

    /// Build the user prompt for `text`.
    pub fn user_prompt(self, text: &str) -> String {
        match self {
            Self::Conversation => text.to_string(),
            Self::Admonish => format!(
                "Someone said this in a groupchat: {}. Please answer creatively and remind them that hate speech will not be tolerated.",
                text
            ),
        }
    }
}

/// A fully built generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub template: PromptTemplate,
    pub system_instruction: &'static str,
    pub user_prompt: String,
}

impl Prompt {
    pub fn new(template: PromptTemplate, text: &str) -> Self {
        Self {
            template,
            system_instruction: template.system_instruction(),
            user_prompt: template.user_prompt(text),
        }
    }
}

/// Anything that can produce a reply for a prompt.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Generate a reply, turning any failure into user-visible fallback text.
///
/// Timeouts count as failures. This never returns an error.
pub async fn reply_or_fallback(
    responder: &dyn Responder,
    prompt: &Prompt,
    timeout: Duration,
) -> ReplyText {
    let outcome = match tokio::time::timeout(timeout, responder.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(HatewatchError::Timeout {
            operation: "generation",
            after_ms: timeout.as_millis() as u64,
        }),
    };

    match outcome {
        Ok(text) => ReplyText::Generated(text),
        Err(e) => {
            tracing::warn!(template = ?prompt.template, error = %e, "Reply generation failed");
            ReplyText::Fallback(format!("An error occurred: {}", e.user_message()))
        }
    }
}

/// Text to post as a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyText {
    Generated(String),
    /// Error text shown instead of a generated reply.
    Fallback(String),
}

impl ReplyText {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Generated(text) | Self::Fallback(text) => text,
        }
    }
}

/// Rate limiter type alias.
type RateLimiter = GovRateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Gemini-backed reply generator.
pub struct GeminiResponder {
    client: reqwest::Client,
    api_key: String,
    settings: GenerationSettings,
    rate_limiter: Arc<RateLimiter>,
}

impl GeminiResponder {
    /// Create a new GeminiResponder with custom rate limit.
    pub fn with_rate_limit(
        api_key: String,
        settings: GenerationSettings,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        let rate_limiter = Arc::new(GovRateLimiter::direct(quota));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            settings,
            rate_limiter,
        })
    }

    /// Build the Gemini API request.
    fn build_request(&self, prompt: &Prompt) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.user_prompt.clone(),
                }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: prompt.system_instruction.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: self.settings.max_output_tokens,
                temperature: self.settings.temperature,
            },
        }
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.rate_limiter.until_ready().await;

        let request = self.build_request(prompt);
        let response = self
            .client
            .post(GEMINI_API_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(HatewatchError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HatewatchError::Generation(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        extract_text(gemini_response)
    }
}

/// Pull the reply text out of the first candidate.
fn extract_text(response: GeminiResponse) -> Result<String> {
    let text = response
        .candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(HatewatchError::Generation(
            "response contained no text".to_string(),
        ));
    }
    Ok(text.to_string())
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

/// Request to Gemini API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiSystemInstruction>,
    pub generation_config: GenerationConfig,
}

/// Content block in Gemini request.
#[derive(Debug, Serialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

/// System instruction for Gemini.
#[derive(Debug, Serialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiPart>,
}

/// Sampling parameters for Gemini.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// Part of a content block.
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: String,
}

/// Response from Gemini API.
#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

/// Candidate response from Gemini.
#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: GeminiCandidateContent,
}

/// Content in a candidate response.
#[derive(Debug, Deserialize)]
pub struct GeminiCandidateContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}
