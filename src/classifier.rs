//! Hate speech classification.
//!
//! The moderation core only needs a label. The production adapter calls a
//! Hugging Face text-classification model over HTTP.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{Quota, RateLimiter as GovRateLimiter};
use serde::{Deserialize, Serialize};
use serenity::async_trait;
use tracing::Instrument;

use crate::error::{HatewatchError, Result};
use crate::models::{Classification, Label};

/// Rate limiter type alias.
type RateLimiter = GovRateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Anything that can label a message body.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}

/// Classifier backed by the Hugging Face Inference API.
pub struct HuggingFaceClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl HuggingFaceClassifier {
    /// Create a classifier for `model` served under `base_url`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_token: Option<String>,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), model),
            api_token,
            rate_limiter: Arc::new(GovRateLimiter::direct(quota)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HuggingFaceClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        self.rate_limiter.until_ready().await;

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&InferenceRequest { inputs: text });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

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
            return Err(HatewatchError::Classifier(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body: InferenceResponse = response.json().await?;
        parse_inference(body)
    }
}

/// What [`classify_or_fail_open`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Classified(Classification),
    /// The classifier errored or timed out.
    FailedOpen,
}

impl ClassifyOutcome {
    pub fn is_failed_open(&self) -> bool {
        matches!(self, Self::FailedOpen)
    }

    /// The classification to act on; a failure counts as not-hate.
    pub fn into_classification(self) -> Classification {
        match self {
            Self::Classified(classification) => classification,
            Self::FailedOpen => Classification::fail_open(),
        }
    }
}

/// Classify with a deadline, failing open on any error.
///
/// The call is wrapped in a `classify` span that records how long the
/// classifier took.
pub async fn classify_or_fail_open(
    classifier: &dyn Classifier,
    text: &str,
    timeout: Duration,
) -> ClassifyOutcome {
    let span = tracing::info_span!("classify", elapsed_ms = tracing::field::Empty);
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, classifier.classify(text))
        .instrument(span.clone())
        .await;

    span.record("elapsed_ms", started.elapsed().as_millis() as u64);
    let _entered = span.enter();

    match outcome {
        Ok(Ok(classification)) => {
            tracing::debug!(
                label = ?classification.label,
                score = ?classification.score,
                "Message classified"
            );
            ClassifyOutcome::Classified(classification)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Classifier failed, treating message as not-hate");
            ClassifyOutcome::FailedOpen
        }
        Err(_) => {
            let e = HatewatchError::Timeout {
                operation: "classification",
                after_ms: timeout.as_millis() as u64,
            };
            tracing::warn!(error = %e, "Classifier timed out, treating message as not-hate");
            ClassifyOutcome::FailedOpen
        }
    }
}

/// Pick the highest scoring label from an inference response.
fn parse_inference(response: InferenceResponse) -> Result<Classification> {
    let scores = match response {
        InferenceResponse::Nested(batches) => batches.into_iter().next().unwrap_or_default(),
        InferenceResponse::Flat(scores) => scores,
    };

    let best = scores
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| HatewatchError::Classifier("empty classification response".to_string()))?;

    Ok(Classification {
        label: Label::from_raw(&best.label),
        score: Some(best.score),
    })
}

// ============================================================================
// Inference API Request/Response Types
// ============================================================================

/// Request to the inference API.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// Label with confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Text classification output; batched or flat depending on the deployment.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}
