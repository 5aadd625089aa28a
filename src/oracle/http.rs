//! HTTP-backed oracles.
//!
//! # Retry Strategy
//!
//! Both providers share [`post_with_retry`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::RawJudgment;
use crate::prompts::{is_yes, PromptTemplate};

use super::RelevanceOracle;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Shared request settings for the HTTP providers.
struct HttpSettings {
    client: Client,
    model: String,
    base_url: String,
    template: PromptTemplate,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl HttpSettings {
    fn new(
        config: &OracleConfig,
        template: PromptTemplate,
        default_url: &str,
    ) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for {} provider", config.provider))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            model,
            base_url,
            template,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    fn judgment(&self, text: String) -> RawJudgment {
        if self.template.is_boolean() {
            RawJudgment::Match(is_yes(&text))
        } else {
            RawJudgment::Text(text)
        }
    }
}

/// Send the request built by `build`, retrying transient failures.
///
/// Returns the parsed JSON body of the first successful response.
async fn post_with_retry<F>(max_retries: u32, build: F) -> Result<serde_json::Value, OracleError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, ?delay, "retrying oracle request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| OracleError::InvalidResponse(e.to_string()));
                }

                let body = response.text().await.unwrap_or_default();
                let err = OracleError::Status {
                    status: status.as_u16(),
                    body,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(status = status.as_u16(), attempt, "oracle request failed, will retry");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                warn!(attempt, "oracle request error: {}", e);
                last_err = Some(e.into());
            }
        }
    }

    Err(last_err.unwrap_or_else(|| OracleError::Request("oracle failed after retries".to_string())))
}

// ============ OpenAI ============

/// OpenAI-compatible chat completions oracle.
///
/// Calls `POST {url}/v1/chat/completions`. The API key comes from
/// `OPENAI_API_KEY`.
pub struct OpenAiOracle {
    settings: HttpSettings,
    api_key: String,
    name: String,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig, template: PromptTemplate) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, template, api_key)
    }

    pub fn with_api_key(
        config: &OracleConfig,
        template: PromptTemplate,
        api_key: String,
    ) -> anyhow::Result<Self> {
        let settings = HttpSettings::new(config, template, OPENAI_URL)?;
        let name = format!("openai:{}", settings.model);
        Ok(Self {
            settings,
            api_key,
            name,
        })
    }
}

#[async_trait]
impl RelevanceOracle for OpenAiOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, content: &str, query: &str) -> Result<RawJudgment, OracleError> {
        let s = &self.settings;
        let body = serde_json::json!({
            "model": s.model,
            "messages": [{ "role": "user", "content": s.template.render(query, content) }],
            "max_tokens": s.max_tokens,
            "temperature": s.temperature,
        });
        let url = format!("{}/v1/chat/completions", s.base_url);

        let json = post_with_retry(s.max_retries, || {
            s.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                OracleError::InvalidResponse("missing choices[0].message.content".to_string())
            })?;
        Ok(s.judgment(text.trim().to_string()))
    }
}

// ============ Ollama ============

/// Oracle backed by a local Ollama instance (`POST {url}/api/generate`).
pub struct OllamaOracle {
    settings: HttpSettings,
    name: String,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig, template: PromptTemplate) -> anyhow::Result<Self> {
        let settings = HttpSettings::new(config, template, OLLAMA_URL)?;
        let name = format!("ollama:{}", settings.model);
        Ok(Self { settings, name })
    }
}

#[async_trait]
impl RelevanceOracle for OllamaOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, content: &str, query: &str) -> Result<RawJudgment, OracleError> {
        let s = &self.settings;
        let body = serde_json::json!({
            "model": s.model,
            "prompt": s.template.render(query, content),
            "stream": false,
            "options": {
                "temperature": s.temperature,
                "num_predict": s.max_tokens,
            },
        });
        let url = format!("{}/api/generate", s.base_url);

        let json = post_with_retry(s.max_retries, || s.client.post(&url).json(&body)).await?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| OracleError::InvalidResponse("missing response field".to_string()))?;
        Ok(s.judgment(text.trim().to_string()))
    }
}
