use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::TimestampCodec;
use crate::error::ConfigError;
use crate::sources::postprocess::PostProcess;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub timestamps: TimestampCodec,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: u8,
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
    #[serde(default = "default_source_delay_ms")]
    pub source_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: default_min_relevance_score(),
            content_max_chars: default_content_max_chars(),
            source_delay_ms: default_source_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

fn default_min_relevance_score() -> u8 {
    50
}
fn default_content_max_chars() -> usize {
    1000
}
fn default_source_delay_ms() -> u64 {
    1000
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_oracle_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            template: default_template(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "keyword".to_string()
}
fn default_template() -> String {
    "default".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default = "default_true")]
    pub cleanup_enabled: bool,
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            max_runs: None,
            cleanup_enabled: true,
            cleanup_days: default_cleanup_days(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    60
}
fn default_cleanup_days() -> u32 {
    30
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Feed,
    Reddit,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub postprocess: PostProcess,
}

impl SourceConfig {
    /// Display name; reddit sources default to `Reddit r/<sub>`.
    pub fn resolved_name(&self) -> Option<String> {
        match (&self.name, self.kind, &self.subreddit) {
            (Some(name), _, _) => Some(name.clone()),
            (None, SourceKind::Reddit, Some(sub)) => Some(format!("Reddit r/{}", sub)),
            _ => None,
        }
    }

    /// Feed URL; reddit sources derive theirs from the subreddit.
    pub fn resolved_url(&self) -> Option<String> {
        match (&self.url, self.kind, &self.subreddit) {
            (Some(url), _, _) => Some(url.clone()),
            (None, SourceKind::Reddit, Some(sub)) => {
                Some(format!("https://www.reddit.com/r/{}/.rss", sub))
            }
            _ => None,
        }
    }

    /// Post-processing step; reddit sources always get reddit cleanup.
    pub fn resolved_postprocess(&self) -> PostProcess {
        match (self.kind, &self.postprocess) {
            (SourceKind::Reddit, PostProcess::None) => PostProcess::Reddit,
            (_, p) => p.clone(),
        }
    }
}

impl PipelineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }
}

impl Config {
    /// A config with every section defaulted, for commands that only touch the database.
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig {
                path: db_path,
                timestamps: TimestampCodec::default(),
            },
            pipeline: PipelineConfig::default(),
            oracle: OracleConfig::default(),
            schedule: ScheduleConfig::default(),
            sources: Vec::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check run parameters. Every failure is a [`ConfigError`].
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if !(1..=100).contains(&config.pipeline.min_relevance_score) {
        return Err(ConfigError::new(
            "pipeline.min_relevance_score must be in [1, 100]",
        ));
    }
    if config.pipeline.content_max_chars == 0 {
        return Err(ConfigError::new("pipeline.content_max_chars must be > 0"));
    }
    if config.pipeline.fetch_timeout_secs == 0 || config.pipeline.oracle_timeout_secs == 0 {
        return Err(ConfigError::new(
            "pipeline.fetch_timeout_secs and pipeline.oracle_timeout_secs must be > 0",
        ));
    }

    if config.schedule.interval_minutes == 0 {
        return Err(ConfigError::new("schedule.interval_minutes must be > 0"));
    }
    if config.schedule.interval_minutes.checked_mul(60).is_none() {
        return Err(ConfigError::new("schedule.interval_minutes is too large"));
    }
    if config.schedule.max_runs == Some(0) {
        return Err(ConfigError::new(
            "schedule.max_runs must be >= 1 (omit it for unbounded runs)",
        ));
    }
    if config.schedule.cleanup_enabled && config.schedule.cleanup_days == 0 {
        return Err(ConfigError::new(
            "schedule.cleanup_days must be > 0 when cleanup is enabled",
        ));
    }

    match config.oracle.provider.as_str() {
        "keyword" | "disabled" => {}
        "openai" | "ollama" => {
            if config.oracle.model.is_none() {
                return Err(ConfigError(format!(
                    "oracle.model must be specified when provider is '{}'",
                    config.oracle.provider
                )));
            }
        }
        other => {
            return Err(ConfigError(format!(
                "Unknown oracle provider: '{}'. Must be keyword, openai, ollama, or disabled.",
                other
            )))
        }
    }

    match config.oracle.template.as_str() {
        "default" | "technical" | "news" | "yes_no" => {}
        other => {
            return Err(ConfigError(format!(
                "Unknown oracle template: '{}'. Must be default, technical, news, or yes_no.",
                other
            )))
        }
    }

    let mut names = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        let name = source
            .resolved_name()
            .ok_or_else(|| ConfigError(format!("sources[{}] needs a name", i)))?;
        if source.resolved_url().is_none() {
            return Err(ConfigError(format!(
                "source '{}' needs a url (or a subreddit for kind = \"reddit\")",
                name
            )));
        }
        if !names.insert(name.clone()) {
            return Err(ConfigError(format!("duplicate source name: '{}'", name)));
        }
    }

    Ok(())
}
