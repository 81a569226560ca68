//! Narrative synthesis over an assembled context or a comparison bundle
//!
//! Synthesis is an opaque capability: the engine hands it data and gets text
//! back. A failure here never loses the data; callers attach an
//! [`Analysis::Unavailable`] instead.

use crate::config::{CredentialsConfig, SynthesisConfig};
use crate::models::{ComparisonBundle, LocationContext};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const DEFAULT_GOALS: &str = "General neighborhood assessment";

const SYSTEM_PROMPT: &str = "You are an expert in real estate and city analytics.";

/// Why synthesis produced no text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("synthesis unavailable: {0}")]
    Unavailable(String),

    #[error("synthesis rate limited")]
    RateLimited,

    #[error("malformed synthesis response: {0}")]
    Malformed(String),
}

/// What to synthesize
#[derive(Debug, Clone, Copy)]
pub enum SynthesisInput<'a> {
    Context {
        context: &'a LocationContext,
        goals: &'a str,
    },
    Comparison {
        bundle: &'a ComparisonBundle,
        goals: &'a str,
    },
}

#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, input: SynthesisInput<'_>) -> Result<String, SynthesisError>;
}

/// Synthesis outcome attached to results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Available { text: String },
    Unavailable { reason: String },
}

impl Analysis {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Analysis::Available { .. })
    }
}

impl From<Result<String, SynthesisError>> for Analysis {
    fn from(result: Result<String, SynthesisError>) -> Self {
        match result {
            Ok(text) => Analysis::Available { text },
            Err(e) => Analysis::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

/// Prompt text for an input
pub fn build_prompt(input: SynthesisInput<'_>) -> Result<String, SynthesisError> {
    match input {
        SynthesisInput::Context { context, goals } => Ok(format!(
            "You are an AI neighborhood analyst. Assess this location based on:\n\
             - Livability (walkability, amenities, weather)\n\
             - Affordability (housing costs vs income)\n\
             - Safety (crime data, air quality)\n\
             - Convenience (commute times, nearby services)\n\n\
             Records marked \"confidence\": \"low\" are estimates, not measurements.\n\
             Records with status \"unavailable\" carry no data.\n\n\
             User goal: {goals}\n\
             Data: {}\n\n\
             Provide a structured evaluation with:\n\
             1. Overall livability score (1-10)\n\
             2. Top 3 pros\n\
             3. Top 3 cons\n\
             4. Recommendation (Buy/Rent/Pass)\n\
             5. Best for: (type of resident)",
            encode(context)?
        )),
        SynthesisInput::Comparison { bundle, goals } => Ok(format!(
            "You are an AI neighborhood analyst comparing {} locations.\n\
             The ranking is computed from weighted, normalized fields; locations \
             flagged insufficient_data lack enough data to be ranked.\n\
             Delta values marked \"estimated\" come from low-confidence estimates.\n\n\
             User goal: {goals}\n\
             Data: {}\n\n\
             Provide:\n\
             1. A short verdict naming the best fit for the goal\n\
             2. The key trade-offs between the locations\n\
             3. Which gaps in the data could change the verdict",
            bundle.contexts.len(),
            encode(bundle)?
        )),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, SynthesisError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SynthesisError::Malformed(format!("cannot encode input: {e}")))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions (OpenRouter by default)
pub struct OpenRouterClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenRouterClient {
    #[must_use]
    pub fn new(client: Client, config: &SynthesisConfig, credentials: &CredentialsConfig) -> Self {
        Self {
            client,
            api_key: credentials.openrouter_api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.into()),
        }
    }
}

#[async_trait]
impl SynthesisClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn synthesize(&self, input: SynthesisInput<'_>) -> Result<String, SynthesisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SynthesisError::Unavailable("OPENROUTER_API_KEY not set".into()))?;
        let prompt = build_prompt(input)?;

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Unavailable("request timed out".into())
                } else {
                    SynthesisError::Unavailable(format!("request failed: {e}"))
                }
            })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Synthesis provider is rate limiting");
                return Err(SynthesisError::RateLimited);
            }
            status if !status.is_success() => {
                return Err(SynthesisError::Unavailable(format!("HTTP {status}")));
            }
            _ => {}
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Malformed(format!("failed to parse response: {e}")))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SynthesisError::Malformed("empty completion".into()))?;

        debug!(chars = text.len(), "Synthesis complete");
        Ok(text)
    }
}
