//! Core data models used throughout feedsift.
//!
//! These types represent the items, sources, queries, and relevance
//! judgments that flow through the ingestion and evaluation pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// One fetched unit of content, normalized by a source adapter.
///
/// `(identity, source_name)` is the natural key: the same link may appear
/// verbatim in two feeds and both copies are kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub identity: String,
    pub source_name: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl Item {
    /// Build an item, deriving its identity with [`derive_identity`].
    ///
    /// Description and content start empty; both timestamps default to now.
    pub fn new(source_name: &str, guid: Option<&str>, link: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            identity: derive_identity(guid, link, title, ""),
            source_name: source_name.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            description: String::new(),
            content: String::new(),
            published_at: now,
            fetched_at: now,
        }
    }

    /// The text handed to the relevance oracle, capped at `max_chars` characters.
    pub fn evaluation_text(&self, max_chars: usize) -> String {
        let content: String = self.content.chars().take(max_chars).collect();
        let ellipsis = if self.content.chars().count() > max_chars {
            "..."
        } else {
            ""
        };
        format!(
            "Title: {}\nDescription: {}\nContent: {}{}",
            self.title, self.description, content, ellipsis
        )
    }
}

/// Item identity: the source-provided guid when present, else the link.
///
/// Entries carrying neither get a SHA-256 over title and content so the
/// identity is never empty.
pub fn derive_identity(guid: Option<&str>, link: &str, title: &str, content: &str) -> String {
    if let Some(guid) = guid.map(str::trim).filter(|g| !g.is_empty()) {
        return guid.to_string();
    }
    let link = link.trim();
    if !link.is_empty() {
        return link.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(content.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// A named, URL-addressed producer of items, as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub name: String,
    pub url: String,
    pub last_consumed_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a [`Query`].
///
/// A resolved query always names the item that resolved it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryState {
    Open,
    Resolved {
        item_identity: String,
        source_name: String,
        resolved_at: DateTime<Utc>,
    },
}

/// A standing question items are judged against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub id: i64,
    pub text: String,
    pub state: QueryState,
    pub created_at: DateTime<Utc>,
}

impl Query {
    pub fn is_open(&self) -> bool {
        matches!(self.state, QueryState::Open)
    }

    pub fn resolved_by_item_identity(&self) -> Option<&str> {
        match &self.state {
            QueryState::Open => None,
            QueryState::Resolved { item_identity, .. } => Some(item_identity),
        }
    }
}

/// Categorical relevance verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RelevanceLabel {
    Yes,
    No,
    Partially,
    Unknown,
    Error,
}

impl RelevanceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLabel::Yes => "Yes",
            RelevanceLabel::No => "No",
            RelevanceLabel::Partially => "Partially",
            RelevanceLabel::Unknown => "Unknown",
            RelevanceLabel::Error => "Error",
        }
    }

    /// Lenient parse of an oracle answer such as `"[Yes]"` or `"partially relevant"`.
    ///
    /// Anything unrecognised maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        let word = value
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match word.as_str() {
            "yes" => RelevanceLabel::Yes,
            "no" => RelevanceLabel::No,
            "partially" | "partial" => RelevanceLabel::Partially,
            "error" => RelevanceLabel::Error,
            _ => RelevanceLabel::Unknown,
        }
    }
}

impl fmt::Display for RelevanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of judging one item against one query.
///
/// Append-only: records are never updated, only removed by retention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceRecord {
    pub item_identity: String,
    pub source_name: String,
    pub query_id: i64,
    pub score: u8,
    pub label: RelevanceLabel,
    pub explanation: String,
    pub key_information: String,
    pub summary: String,
    pub raw_response: String,
    pub evaluated_at: DateTime<Utc>,
}

impl RelevanceRecord {
    /// A record with every field at its default (`score = 0`, `Unknown`).
    pub fn empty(item: &Item, query: &Query) -> Self {
        Self {
            item_identity: item.identity.clone(),
            source_name: item.source_name.clone(),
            query_id: query.id,
            score: 0,
            label: RelevanceLabel::Unknown,
            explanation: String::new(),
            key_information: String::new(),
            summary: String::new(),
            raw_response: String::new(),
            evaluated_at: Utc::now(),
        }
    }
}

/// Raw oracle output before parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawJudgment {
    /// A yes/no matcher answer.
    Match(bool),
    /// Freeform text following the labeled-field template.
    Text(String),
}

/// Aggregate store counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub item_count: i64,
    pub record_count: i64,
    pub source_count: i64,
    pub query_count: i64,
    pub open_query_count: i64,
    pub size_bytes: u64,
}

/// Per-source breakdown for `sift stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceBreakdown {
    pub name: String,
    pub url: String,
    pub last_consumed_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub record_count: i64,
    pub avg_score: Option<f64>,
}

/// Per-query breakdown for `sift stats`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryBreakdown {
    pub id: i64,
    pub text: String,
    pub resolved: bool,
    pub record_count: i64,
    pub avg_score: Option<f64>,
}
