//! Completion endpoint adapters.
//!
//! Both endpoints speak the OpenAI chat-completions protocol. Calls are
//! blocking (`ureq`): the pipeline is strictly sequential and has no async
//! runtime.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{ModelCandidate, Provider};
use crate::io::config::{CompletionConfig, EndpointConfig};
use crate::io::credentials::Credentials;

/// Errors from completion calls. All of them are treated as transient by the
/// generation pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("response parse error: {0}")]
    Parse(String),
    #[error("{0} completion provider is not configured")]
    ProviderUnavailable(Provider),
}

/// Uniform `complete(model, prompt) -> text` boundary.
pub trait CompletionClient {
    /// Request a completion. Empty text is a valid (if useless) answer; the
    /// caller decides what to do with it.
    fn complete(&self, candidate: &ModelCandidate, prompt: &str) -> Result<String, CompletionError>;

    /// Whether calls for `provider` can be served at all.
    fn has_provider(&self, provider: Provider) -> bool;
}

/// Blocking client for one OpenAI-compatible endpoint.
pub struct OpenAiCompatProvider {
    api_key: String,
    base_url: String,
    agent: ureq::Agent,
}

impl OpenAiCompatProvider {
    pub fn new(endpoint: &EndpointConfig, api_key: String) -> Self {
        Self {
            api_key,
            base_url: endpoint.base_url.clone(),
            agent: ureq::Agent::new_with_config(
                ureq::config::Config::builder()
                    .timeout_global(Some(endpoint.request_timeout()))
                    .http_status_as_error(false)
                    .build(),
            ),
        }
    }

    #[instrument(skip_all, fields(model = model, base_url = %self.base_url))]
    pub fn complete(&self, model: &str, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .send_json(&body)
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| CompletionError::Http(e.to_string()))?;
        debug!(status, bytes = text.len(), "completion response received");
        parse_chat_response(status, &text)
    }
}

/// Extract the first choice's message content from a chat-completions body.
///
/// A `null` or missing content field yields an empty string rather than an
/// error, so callers can treat it like any other empty answer.
pub fn parse_chat_response(status: u16, body: &str) -> Result<String, CompletionError> {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) if status >= 400 => {
            return Err(CompletionError::Api {
                status,
                message: body.trim().chars().take(500).collect(),
            });
        }
        Err(e) => return Err(CompletionError::Parse(e.to_string())),
    };

    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Err(CompletionError::Api { status, message });
    }
    if status >= 400 {
        return Err(CompletionError::Api {
            status,
            message: "unexpected error response".to_string(),
        });
    }

    let choice = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .ok_or_else(|| CompletionError::Parse("response has no choices".to_string()))?;
    let content = choice
        .get("message")
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(content.to_string())
}

/// Routes each model candidate to its provider's endpoint.
pub struct ProviderRouter {
    primary: OpenAiCompatProvider,
    fallback: Option<OpenAiCompatProvider>,
}

impl ProviderRouter {
    pub fn from_config(cfg: &CompletionConfig, credentials: &Credentials) -> Self {
        Self {
            primary: OpenAiCompatProvider::new(&cfg.primary, credentials.primary.clone()),
            fallback: credentials
                .fallback
                .clone()
                .map(|key| OpenAiCompatProvider::new(&cfg.fallback, key)),
        }
    }
}

impl CompletionClient for ProviderRouter {
    fn complete(&self, candidate: &ModelCandidate, prompt: &str) -> Result<String, CompletionError> {
        match candidate.provider {
            Provider::Primary => self.primary.complete(&candidate.model_id, prompt),
            Provider::Fallback => match &self.fallback {
                Some(provider) => provider.complete(&candidate.model_id, prompt),
                None => Err(CompletionError::ProviderUnavailable(Provider::Fallback)),
            },
        }
    }

    fn has_provider(&self, provider: Provider) -> bool {
        match provider {
            Provider::Primary => true,
            Provider::Fallback => self.fallback.is_some(),
        }
    }
}
