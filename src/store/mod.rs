//! Storage abstraction for feedsift.
//!
//! Two traits split the persistent state by concern:
//!
//! - [`ItemStore`]: the deduplicating store for sources, items, and
//!   relevance records.
//! - [`QueryLedger`]: open/resolved queries with first-writer-wins resolution.
//!
//! Both are implemented by [`sqlite::SqliteStore`] (durable) and
//! [`memory::InMemoryStore`] (tests). Implementations must enforce
//! deduplication and conditional resolution atomically in the storage
//! layer, never as a lookup followed by a write.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Item, Query, QueryBreakdown, RelevanceRecord, SourceBreakdown, SourceRecord, StoreStats,
};

/// Deduplicating store for items, sources, and relevance records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](ItemStore::upsert_source) | Record a source and stamp `last_consumed_at` |
/// | [`store_items`](ItemStore::store_items) | Insert new items, skipping known `(identity, source)` pairs |
/// | [`store_relevance_record`](ItemStore::store_relevance_record) | Append one judgment |
/// | [`relevant_items`](ItemStore::relevant_items) | Ranked items for a query text |
/// | [`cleanup_older_than`](ItemStore::cleanup_older_than) | Retention |
/// | [`stats`](ItemStore::stats) | Aggregate counters |
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or refresh a source, setting `last_consumed_at = now`.
    async fn upsert_source(&self, name: &str, url: &str) -> Result<()>;

    /// Insert every item whose `(identity, source_name)` is not stored yet.
    ///
    /// Returns the number actually inserted. A failing item is logged and
    /// skipped; only a store-wide failure is returned as an error.
    async fn store_items(&self, items: &[Item]) -> Result<usize>;

    /// Append a relevance record.
    ///
    /// Returns `false` (and logs) when the referenced item cannot be found
    /// by identity and source, or the insert fails.
    async fn store_relevance_record(&self, record: &RelevanceRecord) -> bool;

    /// Items judged against `query_text` with `score >= min_score`.
    ///
    /// Ordered by score descending, then publish time descending, then
    /// record insertion order.
    async fn relevant_items(
        &self,
        query_text: &str,
        min_score: u8,
        limit: usize,
    ) -> Result<Vec<(Item, RelevanceRecord)>>;

    /// Remove items fetched more than `days` ago together with their
    /// records, in one transaction. Returns the number of items removed.
    async fn cleanup_older_than(&self, days: u32) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn list_sources(&self) -> Result<Vec<SourceRecord>>;

    async fn source_breakdown(&self) -> Result<Vec<SourceBreakdown>>;

    async fn query_breakdown(&self) -> Result<Vec<QueryBreakdown>>;
}

/// Query lifecycle: `Open → Resolved`, exactly once.
#[async_trait]
pub trait QueryLedger: Send + Sync {
    /// Create an open query. Returns the existing query when `text` is known.
    async fn add_query(&self, text: &str) -> Result<Query>;

    /// Open queries in creation order.
    async fn list_open(&self) -> Result<Vec<Query>>;

    /// All queries in creation order.
    async fn list_queries(&self) -> Result<Vec<Query>>;

    /// Bind `query_id` to `item` if and only if the query is still open.
    ///
    /// Returns `true` for the single winning call; later or concurrent
    /// calls return `false`. Losing the race is not an error.
    async fn resolve(&self, query_id: i64, item: &Item) -> Result<bool>;
}
