//! Relevance oracle abstraction and implementations.
//!
//! An oracle judges one piece of content against one query text and returns
//! a [`RawJudgment`]: either a yes/no match or freeform text in the
//! labeled-field format read by the [`parser`](crate::parser).
//!
//! - **[`KeywordOracle`]**: deterministic offline judge, no network.
//! - **[`DisabledOracle`]**: every evaluation fails.
//! - **[`http::OpenAiOracle`]**: OpenAI-compatible chat completions.
//! - **[`http::OllamaOracle`]**: local Ollama `/api/generate`.
//!
//! Use [`create_oracle`] to build the provider named in `[oracle]`.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::RawJudgment;
use crate::prompts::PromptTemplate;

#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    /// Provider identifier for logs (e.g. `"keyword"`, `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    async fn evaluate(&self, content: &str, query: &str) -> Result<RawJudgment, OracleError>;
}

/// Build the oracle named by `config.provider`.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn RelevanceOracle>> {
    let template = PromptTemplate::from_name(&config.template)?;
    match config.provider.as_str() {
        "keyword" => Ok(Arc::new(KeywordOracle::new(template.is_boolean()))),
        "openai" => Ok(Arc::new(http::OpenAiOracle::new(config, template)?)),
        "ollama" => Ok(Arc::new(http::OllamaOracle::new(config, template)?)),
        "disabled" => Ok(Arc::new(DisabledOracle)),
        other => anyhow::bail!("Unknown oracle provider: {}", other),
    }
}

/// Oracle used when `oracle.provider = "disabled"`.
pub struct DisabledOracle;

#[async_trait]
impl RelevanceOracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn evaluate(&self, _content: &str, _query: &str) -> Result<RawJudgment, OracleError> {
        Err(OracleError::Disabled)
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "are", "was", "were", "has", "have", "had", "not", "but", "from",
    "that", "this", "what", "when", "where", "which", "who", "why", "how", "about", "into", "over",
    "any", "all", "does", "did", "will", "can", "its", "there", "their",
];

/// Line labels written by [`Item::evaluation_text`](crate::models::Item::evaluation_text).
const FIELD_LABELS: &[&str] = &["Title:", "Description:", "Content:"];

/// Offline judge scoring the share of significant query terms found in the
/// content.
///
/// A term is a lowercase alphanumeric word of at least three characters
/// that is not a stopword. In boolean mode the answer is a match iff every
/// term is present.
pub struct KeywordOracle {
    boolean: bool,
}

impl KeywordOracle {
    pub fn new(boolean: bool) -> Self {
        Self { boolean }
    }

    fn terms(text: &str) -> BTreeSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
            .collect()
    }
}

/// `content` with the leading field label removed from each line.
fn strip_field_labels(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            FIELD_LABELS
                .iter()
                .find_map(|label| line.strip_prefix(label))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl RelevanceOracle for KeywordOracle {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn evaluate(&self, content: &str, query: &str) -> Result<RawJudgment, OracleError> {
        let wanted = Self::terms(query);
        let present = Self::terms(&strip_field_labels(content));
        let found: Vec<&String> = wanted.iter().filter(|t| present.contains(*t)).collect();

        if self.boolean {
            return Ok(RawJudgment::Match(
                !wanted.is_empty() && found.len() == wanted.len(),
            ));
        }

        let score = if wanted.is_empty() {
            0
        } else {
            found.len() * 100 / wanted.len()
        };
        let label = match score {
            0 => "No",
            s if s >= 50 => "Yes",
            _ => "Partially",
        };
        let matched = found
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let summary = content
            .lines()
            .find_map(|l| l.strip_prefix("Title:"))
            .unwrap_or("")
            .trim();

        Ok(RawJudgment::Text(format!(
            "Relevance Score: {}\nRelevance: {}\nExplanation: {} of {} query terms found\nKey Information: {}\nSummary: {}",
            score,
            label,
            found.len(),
            wanted.len(),
            matched,
            summary
        )))
    }
}
