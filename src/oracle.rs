//! Reasoning oracle abstraction.
//!
//! The classifier delegates free-text legal reasoning to a
//! [`ReasoningOracle`] — an opaque completion backend that takes a prompt
//! and returns raw text. Keeping the trait this narrow means the
//! classification logic (prompt construction, response parsing, fallback)
//! is testable with a scripted oracle and never depends on a live API.
//!
//! Retry strategy mirrors the embedding provider: HTTP 429 and 5xx retry
//! with exponential backoff, other 4xx fail immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OracleConfig;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// A text-completion backend for conflict analysis.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Complete a single prompt and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the appropriate [`ReasoningOracle`] based on configuration.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn ReasoningOracle>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatOracle::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledOracle)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

// ============ Disabled Oracle ============

/// A no-op oracle that always returns errors.
///
/// With this oracle every classification takes the degraded path, which
/// keeps the pipeline usable (retrieval still works) when no completion
/// backend is configured.
pub struct DisabledOracle;

#[async_trait]
impl ReasoningOracle for DisabledOracle {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Reasoning oracle is disabled")
    }
}

// ============ OpenAI Chat Oracle ============

/// Oracle backed by an OpenAI-compatible chat completions API.
///
/// Calls `POST {api_base}/chat/completions` with temperature 0 for
/// reproducible verdicts. Requires the `OPENAI_API_KEY` environment
/// variable; `oracle.api_base` may point at any compatible local server.
pub struct OpenAIChatOracle {
    model: String,
    api_base: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAIChatOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ReasoningOracle for OpenAIChatOracle {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Oracle API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Oracle API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Oracle call failed after retries")))
    }
}

/// Parse the chat completions response JSON into the assistant's text.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid oracle response: missing message content"))
}
