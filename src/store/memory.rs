//! In-memory [`ItemStore`] and [`QueryLedger`] for tests and embedding.
//!
//! All state sits behind one `std::sync::Mutex`, so the existence check and
//! the insert (or the state check and the resolve) happen under the same
//! lock and keep the same exactly-once guarantees as the SQLite store.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::warn;

use crate::models::{
    Item, Query, QueryBreakdown, QueryState, RelevanceRecord, SourceBreakdown, SourceRecord,
    StoreStats,
};

use super::{ItemStore, QueryLedger};

#[derive(Default)]
struct State {
    sources: BTreeMap<String, SourceRecord>,
    items: Vec<(u64, Item)>,
    keys: HashSet<(String, String)>,
    records: Vec<(u64, RelevanceRecord)>,
    queries: Vec<Query>,
    next_item_id: u64,
    next_record_id: u64,
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn avg(scores: &[u8]) -> Option<f64> {
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64)
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn upsert_source(&self, name: &str, url: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.sources.insert(
            name.to_string(),
            SourceRecord {
                name: name.to_string(),
                url: url.to_string(),
                last_consumed_at: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn store_items(&self, items: &[Item]) -> Result<usize> {
        let mut state = self.lock()?;
        let mut stored = 0;
        for item in items {
            let key = (item.identity.clone(), item.source_name.clone());
            if !state.keys.insert(key) {
                continue;
            }
            state.next_item_id += 1;
            let id = state.next_item_id;
            state.items.push((id, item.clone()));
            stored += 1;
        }
        Ok(stored)
    }

    async fn store_relevance_record(&self, record: &RelevanceRecord) -> bool {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                warn!("relevance record not stored: {}", e);
                return false;
            }
        };
        let key = (record.item_identity.clone(), record.source_name.clone());
        if !state.keys.contains(&key) {
            warn!(
                identity = %record.item_identity,
                source = %record.source_name,
                query_id = record.query_id,
                "relevance record not stored: item not found"
            );
            return false;
        }
        if !state.queries.iter().any(|q| q.id == record.query_id) {
            warn!(query_id = record.query_id, "relevance record not stored: query not found");
            return false;
        }
        state.next_record_id += 1;
        let id = state.next_record_id;
        let mut stored = record.clone();
        stored.score = stored.score.min(100);
        state.records.push((id, stored));
        true
    }

    async fn relevant_items(
        &self,
        query_text: &str,
        min_score: u8,
        limit: usize,
    ) -> Result<Vec<(Item, RelevanceRecord)>> {
        let state = self.lock()?;
        let Some(query_id) = state
            .queries
            .iter()
            .find(|q| q.text == query_text)
            .map(|q| q.id)
        else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(u64, Item, RelevanceRecord)> = state
            .records
            .iter()
            .filter(|(_, r)| r.query_id == query_id && r.score >= min_score)
            .filter_map(|(id, r)| {
                state
                    .items
                    .iter()
                    .find(|(_, i)| i.identity == r.item_identity && i.source_name == r.source_name)
                    .map(|(_, i)| (*id, i.clone(), r.clone()))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.2.score
                .cmp(&a.2.score)
                .then(b.1.published_at.cmp(&a.1.published_at))
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(_, i, r)| (i, r)).collect())
    }

    async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut state = self.lock()?;

        let stale: HashSet<(String, String)> = state
            .items
            .iter()
            .filter(|(_, i)| i.fetched_at < cutoff)
            .map(|(_, i)| (i.identity.clone(), i.source_name.clone()))
            .collect();

        state.records.retain(|(_, r)| {
            !stale.contains(&(r.item_identity.clone(), r.source_name.clone()))
        });
        state
            .items
            .retain(|(_, i)| !stale.contains(&(i.identity.clone(), i.source_name.clone())));
        for key in &stale {
            state.keys.remove(key);
        }
        Ok(stale.len() as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.lock()?;
        let size_bytes: usize = state
            .items
            .iter()
            .map(|(_, i)| i.title.len() + i.link.len() + i.description.len() + i.content.len())
            .sum::<usize>()
            + state
                .records
                .iter()
                .map(|(_, r)| r.raw_response.len() + r.explanation.len() + r.summary.len())
                .sum::<usize>();
        Ok(StoreStats {
            item_count: state.items.len() as i64,
            record_count: state.records.len() as i64,
            source_count: state.sources.len() as i64,
            query_count: state.queries.len() as i64,
            open_query_count: state.queries.iter().filter(|q| q.is_open()).count() as i64,
            size_bytes: size_bytes as u64,
        })
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let state = self.lock()?;
        Ok(state.sources.values().cloned().collect())
    }

    async fn source_breakdown(&self) -> Result<Vec<SourceBreakdown>> {
        let state = self.lock()?;
        Ok(state
            .sources
            .values()
            .map(|s| {
                let scores: Vec<u8> = state
                    .records
                    .iter()
                    .filter(|(_, r)| r.source_name == s.name)
                    .map(|(_, r)| r.score)
                    .collect();
                SourceBreakdown {
                    name: s.name.clone(),
                    url: s.url.clone(),
                    last_consumed_at: s.last_consumed_at,
                    item_count: state
                        .items
                        .iter()
                        .filter(|(_, i)| i.source_name == s.name)
                        .count() as i64,
                    record_count: scores.len() as i64,
                    avg_score: avg(&scores),
                }
            })
            .collect())
    }

    async fn query_breakdown(&self) -> Result<Vec<QueryBreakdown>> {
        let state = self.lock()?;
        Ok(state
            .queries
            .iter()
            .map(|q| {
                let scores: Vec<u8> = state
                    .records
                    .iter()
                    .filter(|(_, r)| r.query_id == q.id)
                    .map(|(_, r)| r.score)
                    .collect();
                QueryBreakdown {
                    id: q.id,
                    text: q.text.clone(),
                    resolved: !q.is_open(),
                    record_count: scores.len() as i64,
                    avg_score: avg(&scores),
                }
            })
            .collect())
    }
}

#[async_trait]
impl QueryLedger for InMemoryStore {
    async fn add_query(&self, text: &str) -> Result<Query> {
        let text = text.trim();
        anyhow::ensure!(!text.is_empty(), "query text must not be empty");
        let mut state = self.lock()?;
        if let Some(existing) = state.queries.iter().find(|q| q.text == text) {
            return Ok(existing.clone());
        }
        let query = Query {
            id: state.queries.len() as i64 + 1,
            text: text.to_string(),
            state: QueryState::Open,
            created_at: Utc::now(),
        };
        state.queries.push(query.clone());
        Ok(query)
    }

    async fn list_open(&self) -> Result<Vec<Query>> {
        let state = self.lock()?;
        Ok(state.queries.iter().filter(|q| q.is_open()).cloned().collect())
    }

    async fn list_queries(&self) -> Result<Vec<Query>> {
        Ok(self.lock()?.queries.clone())
    }

    async fn resolve(&self, query_id: i64, item: &Item) -> Result<bool> {
        let mut state = self.lock()?;
        match state.queries.iter_mut().find(|q| q.id == query_id) {
            Some(query) if query.is_open() => {
                query.state = QueryState::Resolved {
                    item_identity: item.identity.clone(),
                    source_name: item.source_name.clone(),
                    resolved_at: Utc::now(),
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
