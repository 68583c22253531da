//! Configuration loading from environment.
//!
//! Reads credentials and tuning knobs from environment variables. Missing
//! optional values fall back to defaults; malformed values are rejected.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HatewatchError, Result};

/// Default Hugging Face model used for hate speech classification.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "facebook/roberta-hate-speech-dynabench-r4-target";

/// Default Hugging Face inference endpoint (model name is appended).
pub const DEFAULT_CLASSIFIER_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Main configuration for Hatewatch.
#[derive(Debug, Clone)]
pub struct HatewatchConfig {
    /// Discord bot token.
    pub discord_token: String,
    /// Gemini API key.
    pub gemini_api_key: String,
    /// Hugging Face API token (anonymous access when unset).
    pub hf_api_token: Option<String>,
    /// Classifier model identifier.
    pub classifier_model: String,
    /// Classifier endpoint base URL.
    pub classifier_url: String,
    /// Upper bound on a single classification call.
    pub classifier_timeout: Duration,
    /// Upper bound on a single generation call.
    pub generation_timeout: Duration,
    /// Generation parameters.
    pub generation: GenerationSettings,
    /// Client-side rate limit applied to each external API.
    pub requests_per_minute: u32,
    /// Port for the health check server.
    pub health_port: u16,
}

/// Parameters passed to the response generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    /// Maximum number of output tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 150,
            temperature: 0.7,
        }
    }
}

impl HatewatchConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DISCORD_TOKEN`: Discord bot token
    /// - `GEMINI_API_KEY`: Gemini API key
    ///
    /// Optional environment variables:
    /// - `HF_API_TOKEN`: Hugging Face inference token
    /// - `CLASSIFIER_MODEL`: classifier model id
    /// - `CLASSIFIER_URL`: classifier endpoint base URL
    /// - `CLASSIFIER_TIMEOUT_SECS`: classification timeout (default: 10)
    /// - `GENERATION_TIMEOUT_SECS`: generation timeout (default: 30)
    /// - `GENERATION_MAX_TOKENS`: max output tokens (default: 150)
    /// - `GENERATION_TEMPERATURE`: sampling temperature (default: 0.7)
    /// - `REQUESTS_PER_MINUTE`: per-API client rate limit (default: 60)
    /// - `HEALTH_PORT`: health server port (default: 8080)
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| HatewatchError::Config("DISCORD_TOKEN not set".to_string()))?;

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| HatewatchError::Config("GEMINI_API_KEY not set".to_string()))?;

        let hf_api_token = env::var("HF_API_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let classifier_model =
            env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| DEFAULT_CLASSIFIER_MODEL.to_string());
        let classifier_url =
            env::var("CLASSIFIER_URL").unwrap_or_else(|_| DEFAULT_CLASSIFIER_URL.to_string());

        let classifier_timeout = Duration::from_secs(parse_var("CLASSIFIER_TIMEOUT_SECS", 10)?);
        let generation_timeout = Duration::from_secs(parse_var("GENERATION_TIMEOUT_SECS", 30)?);

        let generation = GenerationSettings {
            max_output_tokens: parse_var("GENERATION_MAX_TOKENS", 150)?,
            temperature: parse_var("GENERATION_TEMPERATURE", 0.7)?,
        };
        validate_generation(&generation)?;

        let requests_per_minute = parse_var("REQUESTS_PER_MINUTE", 60)?;
        let health_port = parse_var("HEALTH_PORT", 8080)?;

        Ok(Self {
            discord_token,
            gemini_api_key,
            hf_api_token,
            classifier_model,
            classifier_url,
            classifier_timeout,
            generation_timeout,
            generation,
            requests_per_minute,
            health_port,
        })
    }
}

/// Parse an optional environment variable, using `default` when unset.
fn parse_var<T>(var_name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var_name) {
        Ok(raw) => parse_value(var_name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(var_name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| HatewatchError::Config(format!("Invalid {}={:?}: {}", var_name, raw, e)))
}

fn validate_generation(settings: &GenerationSettings) -> Result<()> {
    if settings.max_output_tokens == 0 {
        return Err(HatewatchError::Config(
            "GENERATION_MAX_TOKENS must be positive".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&settings.temperature) {
        return Err(HatewatchError::Config(format!(
            "GENERATION_TEMPERATURE must be within [0, 2], got {}",
            settings.temperature
        )));
    }
    Ok(())
}
