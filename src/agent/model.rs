//! Model-client boundary: chat-completion transport plus response parsing.
//!
//! The loops only ever see a [`ModelTurn`]. Transport failures become
//! `Exhausted` after the client's own retries; malformed responses become
//! `ParseFailure` so the loop can feed corrective text back instead of
//! crashing. Nothing from this module panics past the boundary.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::transcript::ChatMessage;
use crate::action::Params;
use crate::error::ModelError;

/// A well-formed action proposal extracted from one model response.
#[derive(Debug, Clone)]
pub struct ParsedAction {
    /// The full response text, appended verbatim to the transcript.
    pub raw: String,
    pub thought: String,
    pub action: String,
    pub params: Params,
}

/// The three outcomes of asking the model for its next move.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// Response parsed into a single action proposal.
    Action(ParsedAction),
    /// Response arrived but carried no parseable action.
    ParseFailure { raw: String },
    /// Transport gave up after retries; the loop should terminate.
    Exhausted { reason: String },
}

/// Chat transport the loops depend on. Implemented by [`HttpModelClient`]
/// for real runs and by scripted fakes in tests.
#[allow(async_fn_in_trait)]
pub trait ModelClient {
    async fn chat(&mut self, transcript: &[ChatMessage]) -> ModelTurn;
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("json block pattern"));

/// Extract an action proposal from raw model text.
///
/// Looks for a fenced ```json block first, then falls back to treating the
/// whole trimmed response as a JSON object. A bare `{"done": true}` is read
/// as `finish_task`.
pub fn parse_turn(raw: &str) -> ModelTurn {
    let candidate = JSON_BLOCK
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| raw.trim().to_string());

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) else {
        return ModelTurn::ParseFailure {
            raw: raw.to_string(),
        };
    };

    let thought = map
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let action = match map.get("action").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None if map.get("done").and_then(Value::as_bool) == Some(true) => {
            "finish_task".to_string()
        }
        None => {
            return ModelTurn::ParseFailure {
                raw: raw.to_string(),
            };
        }
    };

    let params = match map.get("params") {
        Some(Value::Object(p)) => p.clone(),
        Some(_) | None => Params::new(),
    };

    ModelTurn::Action(ParsedAction {
        raw: raw.to_string(),
        thought,
        action,
        params,
    })
}

// ---------------------------------------------------------------------------
// HttpModelClient
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat client for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Owns its retry/backoff: transient transport failures and 5xx/429 statuses
/// are retried with doubling delay; anything else, or running out of
/// attempts, surfaces as `ModelTurn::Exhausted`.
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_attempts: u32,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_attempts: 3,
        }
    }

    async fn request(&self, transcript: &[ChatMessage]) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": transcript,
            "temperature": self.temperature,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(ModelError::EmptyResponse)
    }

    fn retryable(err: &ModelError) -> bool {
        match err {
            ModelError::Transport(_) => true,
            ModelError::BadStatus { status, .. } => *status == 429 || *status >= 500,
            ModelError::EmptyResponse => false,
        }
    }
}

impl ModelClient for HttpModelClient {
    async fn chat(&mut self, transcript: &[ChatMessage]) -> ModelTurn {
        let mut delay = Duration::from_secs(2);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.request(transcript).await {
                Ok(text) => return parse_turn(&text),
                Err(err) => {
                    tracing::warn!(%attempt, error = %err, "chat completion failed");
                    last_error = err.to_string();
                    if !Self::retryable(&err) || attempt == self.max_attempts {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }

        ModelTurn::Exhausted { reason: last_error }
    }
}
