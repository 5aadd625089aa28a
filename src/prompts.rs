//! Prompt templates for the relevance oracle.
//!
//! The labeled-field templates ask for the answer format the
//! [`parser`](crate::parser) reads. `yes_no` is the boolean matcher: its
//! answer becomes a [`RawJudgment::Match`](crate::models::RawJudgment).

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    Default,
    Technical,
    News,
    YesNo,
}

const DEFAULT: &str = r#"### Task: Analyze the following RSS content for relevance to the query: "{query}"

### Content:
{content}

### Instructions:
1. Determine if this content is relevant to the query: "{query}"
2. Provide a relevance score from 0-100 (0 = not relevant, 100 = highly relevant)
3. Explain why it is or isn't relevant
4. Extract any key information related to the query
5. Provide a brief summary

### Response Format:
Relevance Score: [0-100]
Relevance: [Yes/No/Partially]
Explanation: [Brief explanation]
Key Information: [Extracted key points]
Summary: [Brief summary]

### Analysis:"#;

const TECHNICAL: &str = r#"### Task: Technical Analysis of RSS Content

### Query: {query}
### Content:
{content}

### Instructions:
Analyze this technical content for relevance to "{query}".
Focus on technical accuracy, implementation details, and practical applications.

### Response Format:
Relevance Score: [0-100]
Technical Relevance: [Yes/No/Partially]
Explanation: [Why the content is or isn't technically relevant]
Key Information: [Key technical details and implementation notes]
Summary: [Technical summary]

### Analysis:"#;

const NEWS: &str = r#"### Task: News Relevance Analysis

### Query: {query}
### Content:
{content}

### Instructions:
Analyze this news content for relevance to "{query}".
Consider timeliness, impact, and newsworthiness.

### Response Format:
Relevance Score: [0-100]
News Relevance: [Yes/No/Partially]
Explanation: [Impact level (High/Medium/Low) and why]
Key Information: [Important facts and figures]
Summary: [News summary]

### Analysis:"#;

const YES_NO: &str = r#"You are a precise assistant that checks whether an article answers a short question.
Analyze the article text below and answer the question with "Yes" or "No" only.

Article text:
{content}

Question:
{query}

Requirements:
- Answer only with "Yes" or "No".
- Consider only information stated explicitly in the article text.
- If the answer does not follow clearly from the article, answer "No".
- Ignore background knowledge and assumptions outside the article text."#;

impl PromptTemplate {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::Default),
            "technical" => Ok(Self::Technical),
            "news" => Ok(Self::News),
            "yes_no" => Ok(Self::YesNo),
            other => Err(ConfigError(format!("Unknown oracle template: '{}'", other))),
        }
    }

    /// Whether answers are yes/no matches rather than labeled fields.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::YesNo)
    }

    fn text(&self) -> &'static str {
        match self {
            Self::Default => DEFAULT,
            Self::Technical => TECHNICAL,
            Self::News => NEWS,
            Self::YesNo => YES_NO,
        }
    }

    /// Substitute `{query}` and `{content}`.
    ///
    /// `{content}` is substituted last, so braces inside the query text are
    /// never expanded.
    pub fn render(&self, query: &str, content: &str) -> String {
        self.text()
            .replace("{content}", "\u{0}CONTENT\u{0}")
            .replace("{query}", query)
            .replace("\u{0}CONTENT\u{0}", content)
    }
}

/// `true` iff a yes/no answer contains "Yes".
pub fn is_yes(answer: &str) -> bool {
    answer.contains("Yes")
}
