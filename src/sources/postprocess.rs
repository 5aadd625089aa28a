//! Per-source cleanup applied to items after parsing.

use serde::Deserialize;

use crate::models::Item;

/// Post-processing step configured per source.
///
/// ```toml
/// postprocess = "reddit"
/// postprocess = { strip_prefix = "TechCrunch" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcess {
    #[default]
    None,
    /// Drop the "submitted by ..." footer and key items by permalink.
    Reddit,
    /// Remove a leading boilerplate prefix from the content.
    StripPrefix(String),
}

const REDDIT_FOOTER: &str = "submitted by";

pub fn apply(step: &PostProcess, items: Vec<Item>) -> Vec<Item> {
    match step {
        PostProcess::None => items,
        PostProcess::Reddit => items.into_iter().map(reddit).collect(),
        PostProcess::StripPrefix(prefix) => items
            .into_iter()
            .map(|item| strip_prefix(item, prefix))
            .collect(),
    }
}

fn reddit(mut item: Item) -> Item {
    if let Some(pos) = item.content.find(REDDIT_FOOTER) {
        item.content = item.content[..pos].trim().to_string();
    }
    if item.link.contains("reddit") {
        item.identity = item.link.clone();
    }
    item
}

fn strip_prefix(mut item: Item, prefix: &str) -> Item {
    if prefix.is_empty() {
        return item;
    }
    if let Some(rest) = item.content.strip_prefix(prefix) {
        item.content = rest.trim().to_string();
    }
    item
}
