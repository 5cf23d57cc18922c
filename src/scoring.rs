//! HTTP client for the scoring service (any OpenAI-compatible chat API).
//!
//! The whole module is optional at runtime: without `KARDEX_SCORING_URL`
//! there is no config, and the match engine treats that as "semantic
//! matching disabled" rather than an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::KardexError;

const SCORING_TIMEOUT: Duration = Duration::from_secs(30);

fn backend_err(msg: impl Into<String>) -> KardexError {
    KardexError::ScoringBackend(msg.into())
}

#[derive(Clone)]
pub struct ScoringConfig {
    pub url: String,
    pub key: String,
    pub model: String,
    pub client: reqwest::Client,
}

impl ScoringConfig {
    /// Build from environment. `KARDEX_SCORING_URL` is required; key and
    /// model are optional (`KARDEX_SCORING_KEY`, `KARDEX_SCORING_MODEL`).
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("KARDEX_SCORING_URL").ok()?;
        let key = std::env::var("KARDEX_SCORING_KEY").unwrap_or_default();
        let model =
            std::env::var("KARDEX_SCORING_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let client = reqwest::Client::builder()
            .timeout(SCORING_TIMEOUT)
            .build()
            .ok()?;
        Some(Self { url, key, model, client })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One chat completion round trip, returning the raw assistant text.
///
/// The text is free-form model output; callers push it through the JSON
/// sanitizer before trusting any of it. A missing or null message content
/// comes back as "" and fails downstream as "no JSON found" rather than
/// here. Low temperature keeps scores roughly stable across runs.
pub async fn score_text(
    cfg: &ScoringConfig,
    system: &str,
    user: &str,
) -> Result<String, KardexError> {
    let req = ChatRequest {
        model: cfg.model.clone(),
        messages: vec![
            ChatMessage { role: "system".to_string(), content: system.to_string() },
            ChatMessage { role: "user".to_string(), content: user.to_string() },
        ],
        temperature: 0.1,
    };

    let mut builder = cfg.client.post(&cfg.url).json(&req);
    if !cfg.key.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {}", cfg.key));
    }

    let resp = builder
        .send()
        .await
        .map_err(|e| backend_err(format!("scoring request failed: {e}")))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(backend_err(format!("scoring service returned {status}: {body}")));
    }

    let chat: ChatResponse = resp
        .json()
        .await
        .map_err(|e| backend_err(format!("scoring response parse failed: {e}")))?;
    Ok(chat
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default())
}
