//! Source adapters.
//!
//! A [`Source`] turns one remote endpoint into a list of normalized
//! [`Item`]s. Each configured `[[sources]]` entry becomes one adapter; the
//! pipeline consumes them sequentially and isolates their failures.
//!
//! | Kind | Adapter | Notes |
//! |------|---------|-------|
//! | `feed` | [`feed::FeedSource`] | Any RSS or Atom URL |
//! | `reddit` | [`feed::FeedSource`] | URL derived from `subreddit`; reddit cleanup |

pub mod feed;
pub mod postprocess;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::error::FetchError;
use crate::models::Item;
use crate::stats::format_ts_relative;
use crate::store::ItemStore;

/// A named, URL-addressed producer of items.
///
/// `consume` yields every item currently offered by the endpoint, or a
/// [`FetchError`]. Adapters never touch the store.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    async fn consume(&self) -> Result<Vec<Item>, FetchError>;
}

/// Build an adapter for every enabled source in `config`.
pub fn build_sources(config: &Config) -> Result<Vec<Box<dyn Source>>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    for source in config.sources.iter().filter(|s| s.enabled) {
        let name = source
            .resolved_name()
            .context("source is missing a name")?;
        let url = source
            .resolved_url()
            .with_context(|| format!("source '{}' is missing a url", name))?;
        let adapter = feed::FeedSource::new(
            name.clone(),
            url,
            source.resolved_postprocess(),
            config.pipeline.fetch_timeout(),
        )
        .with_context(|| format!("failed to build source '{}'", name))?;
        sources.push(Box::new(adapter));
    }
    Ok(sources)
}

/// Print configured sources with their last consumption time.
pub async fn list_sources(config: &Config, store: &dyn ItemStore) -> Result<()> {
    let known = store.list_sources().await?;

    println!(
        "{:<28} {:<8} {:<9} {:<16} URL",
        "SOURCE", "KIND", "ENABLED", "LAST CONSUMED"
    );
    for source in &config.sources {
        let name = source.resolved_name().unwrap_or_default();
        let url = source.resolved_url().unwrap_or_default();
        let last = known
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.last_consumed_at)
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string());
        let kind = match source.kind {
            crate::config::SourceKind::Feed => "feed",
            crate::config::SourceKind::Reddit => "reddit",
        };
        println!(
            "{:<28} {:<8} {:<9} {:<16} {}",
            name, kind, source.enabled, last, url
        );
    }

    if config.sources.is_empty() {
        println!("(no sources configured)");
    }

    Ok(())
}
