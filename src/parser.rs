//! Response parser: oracle text → [`RelevanceRecord`].
//!
//! The oracle answers in a labeled-field template:
//!
//! ```text
//! Relevance Score: 85
//! Relevance: Yes
//! Explanation: The article announces the release.
//! Key Information: version 2.0, ships in May
//! Summary: Release announcement.
//! ```
//!
//! Each field is extracted independently. For every field the first line
//! containing its label token wins; the value is everything after the first
//! colon following the token, trimmed. A field that is missing or does not
//! parse keeps its default (`score = 0`, `label = Unknown`, empty strings)
//! and never blanks the others. The raw text is always kept verbatim.

use chrono::Utc;

use crate::error::OracleError;
use crate::models::{Item, Query, RawJudgment, RelevanceLabel, RelevanceRecord};

const SCORE_TOKEN: &str = "Relevance Score:";
const LABEL_TOKEN: &str = "Relevance:";
const EXPLANATION_TOKEN: &str = "Explanation:";
const KEY_INFO_TOKEN: &str = "Key Information:";
const SUMMARY_TOKEN: &str = "Summary:";

/// Turn a raw judgment into a fully populated record for `(item, query)`.
pub fn parse_judgment(raw: &RawJudgment, item: &Item, query: &Query) -> RelevanceRecord {
    match raw {
        RawJudgment::Match(matched) => {
            let mut record = RelevanceRecord::empty(item, query);
            record.score = if *matched { 100 } else { 0 };
            record.label = if *matched {
                RelevanceLabel::Yes
            } else {
                RelevanceLabel::No
            };
            record.raw_response = record.label.as_str().to_string();
            record
        }
        RawJudgment::Text(text) => parse_response(text, item, query),
    }
}

/// Parse templated oracle text. Never fails.
pub fn parse_response(text: &str, item: &Item, query: &Query) -> RelevanceRecord {
    let mut record = RelevanceRecord::empty(item, query);
    record.raw_response = text.to_string();

    if let Some(score) = field_value(text, SCORE_TOKEN).and_then(parse_score) {
        record.score = score;
    }
    if let Some(label) = field_value(text, LABEL_TOKEN) {
        record.label = RelevanceLabel::parse(label);
    }
    if let Some(v) = field_value(text, EXPLANATION_TOKEN) {
        record.explanation = v.to_string();
    }
    if let Some(v) = field_value(text, KEY_INFO_TOKEN) {
        record.key_information = v.to_string();
    }
    if let Some(v) = field_value(text, SUMMARY_TOKEN) {
        record.summary = v.to_string();
    }

    record
}

/// Record for an (item, query) pair whose evaluation failed.
pub fn error_record(err: &OracleError, item: &Item, query: &Query) -> RelevanceRecord {
    let mut record = RelevanceRecord::empty(item, query);
    record.label = RelevanceLabel::Error;
    record.explanation = format!("Error evaluating item: {}", err);
    record.raw_response = err.to_string();
    record.evaluated_at = Utc::now();
    record
}

/// Value of the first line containing `token`.
///
/// Every label token ends in its colon, so the split point is the end of
/// the token itself.
fn field_value<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let start = line.find(token)?;
        Some(line[start + token.len()..].trim())
    })
}

/// Leading signed integer of `value`, clamped to `[0, 100]`.
///
/// Accepts decorations such as `[85]`, `85/100`, or `85%`.
fn parse_score(value: &str) -> Option<u8> {
    let trimmed = value.trim_start_matches(|c: char| c == '[' || c == '(' || c.is_whitespace());
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Anything too long for i64 is far above 100 anyway.
    let magnitude: i64 = digits[..end].parse().unwrap_or(i64::MAX);
    Some((sign * magnitude).clamp(0, 100) as u8)
}

/// Whether a judgment resolves its query at `floor`.
///
/// Boolean judgments decide on their own answer. Text judgments match when
/// the parsed score reaches the inclusive floor; a zero score never
/// matches, so an answer with no readable score cannot resolve a query.
pub fn is_match(raw: &RawJudgment, record: &RelevanceRecord, floor: u8) -> bool {
    match raw {
        RawJudgment::Match(matched) => *matched,
        RawJudgment::Text(_) => {
            record.label != RelevanceLabel::Error && record.score > 0 && record.score >= floor
        }
    }
}
