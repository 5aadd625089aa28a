//! SQLite-backed [`ItemStore`] and [`QueryLedger`].
//!
//! Uniqueness rides on `UNIQUE(identity, source_name)` with
//! `ON CONFLICT DO NOTHING`, and resolution is a single conditional
//! `UPDATE ... WHERE resolved = 0`, so both hold under concurrent writers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::codec::TimestampCodec;
use crate::models::{
    Item, Query, QueryBreakdown, QueryState, RelevanceLabel, RelevanceRecord, SourceBreakdown,
    SourceRecord, StoreStats,
};

use super::{ItemStore, QueryLedger};

/// SQLite implementation of [`ItemStore`] and [`QueryLedger`].
///
/// Wraps a [`SqlitePool`] and the [`TimestampCodec`] used for every
/// timestamp column.
pub struct SqliteStore {
    pool: SqlitePool,
    codec: TimestampCodec,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, codec: TimestampCodec) -> Self {
        Self { pool, codec }
    }

    /// Connect to `[db].path`, ensure the schema exists, and use the
    /// configured timestamp codec.
    pub async fn open(config: &crate::config::Config) -> Result<Self> {
        let pool = crate::db::connect(config).await?;
        crate::migrate::create_schema(&pool).await?;
        Ok(Self::new(pool, config.db.timestamps))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn codec(&self) -> TimestampCodec {
        self.codec
    }

    /// Returns whether a row was inserted.
    async fn insert_item(&self, item: &Item) -> Result<bool> {
        let q = sqlx::query(
            r#"
            INSERT INTO items (identity, source_name, title, link, description, content,
                               published_at, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity, source_name) DO NOTHING
            "#,
        )
        .bind(&item.identity)
        .bind(&item.source_name)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.description)
        .bind(&item.content);
        let q = self.codec.bind(q, item.published_at);
        let q = self.codec.bind(q, item.fetched_at);
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_item(&self, row: &SqliteRow) -> Result<Item> {
        Ok(Item {
            identity: row.try_get("identity")?,
            source_name: row.try_get("source_name")?,
            title: row.try_get("title")?,
            link: row.try_get("link")?,
            description: row.try_get("description")?,
            content: row.try_get("content")?,
            published_at: self.codec.decode(row, "published_at")?,
            fetched_at: self.codec.decode(row, "fetched_at")?,
        })
    }

    fn row_to_query(&self, row: &SqliteRow) -> Result<Query> {
        let resolved: i64 = row.try_get("resolved")?;
        let state = if resolved != 0 {
            QueryState::Resolved {
                item_identity: row.try_get("resolved_by_identity")?,
                source_name: row
                    .try_get::<Option<String>, _>("resolved_by_source")?
                    .unwrap_or_default(),
                resolved_at: self
                    .codec
                    .decode_opt(row, "resolved_at")?
                    .unwrap_or_else(Utc::now),
            }
        } else {
            QueryState::Open
        };
        Ok(Query {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            state,
            created_at: self.codec.decode(row, "created_at")?,
        })
    }

    async fn query_by_text(&self, text: &str) -> Result<Option<Query>> {
        let row = sqlx::query(
            "SELECT id, text, resolved, resolved_by_identity, resolved_by_source, resolved_at, created_at
             FROM queries WHERE text = ?",
        )
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| self.row_to_query(&r)).transpose()
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn upsert_source(&self, name: &str, url: &str) -> Result<()> {
        let now = Utc::now();
        let q = sqlx::query(
            r#"
            INSERT INTO sources (name, url, last_consumed_at, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                last_consumed_at = excluded.last_consumed_at
            "#,
        )
        .bind(name)
        .bind(url);
        let q = self.codec.bind(q, now);
        let q = self.codec.bind(q, now);
        q.execute(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert source '{}'", name))?;
        Ok(())
    }

    async fn store_items(&self, items: &[Item]) -> Result<usize> {
        let mut stored = 0usize;
        for item in items {
            match self.insert_item(item).await {
                Ok(true) => stored += 1,
                Ok(false) => {
                    debug!(identity = %item.identity, source = %item.source_name, "duplicate item skipped");
                }
                Err(e) => {
                    warn!(
                        identity = %item.identity,
                        source = %item.source_name,
                        "failed to store item '{}': {:#}",
                        item.title,
                        e
                    );
                }
            }
        }
        Ok(stored)
    }

    async fn store_relevance_record(&self, record: &RelevanceRecord) -> bool {
        let q = sqlx::query(
            r#"
            INSERT INTO relevance_records (item_id, query_id, score, label, explanation,
                                           key_information, summary, raw_response, evaluated_at)
            SELECT id, ?, ?, ?, ?, ?, ?, ?, ?
            FROM items WHERE identity = ? AND source_name = ?
            "#,
        )
        .bind(record.query_id)
        .bind(i64::from(record.score))
        .bind(record.label.as_str())
        .bind(&record.explanation)
        .bind(&record.key_information)
        .bind(&record.summary)
        .bind(&record.raw_response);
        let q = self
            .codec
            .bind(q, record.evaluated_at)
            .bind(&record.item_identity)
            .bind(&record.source_name);

        match q.execute(&self.pool).await {
            Ok(result) if result.rows_affected() == 1 => true,
            Ok(_) => {
                warn!(
                    identity = %record.item_identity,
                    source = %record.source_name,
                    query_id = record.query_id,
                    "relevance record not stored: item not found"
                );
                false
            }
            Err(e) => {
                warn!(
                    identity = %record.item_identity,
                    source = %record.source_name,
                    query_id = record.query_id,
                    "relevance record not stored: {}",
                    e
                );
                false
            }
        }
    }

    async fn relevant_items(
        &self,
        query_text: &str,
        min_score: u8,
        limit: usize,
    ) -> Result<Vec<(Item, RelevanceRecord)>> {
        let rows = sqlx::query(
            r#"
            SELECT i.identity, i.source_name, i.title, i.link, i.description, i.content,
                   i.published_at, i.fetched_at,
                   r.query_id, r.score, r.label, r.explanation, r.key_information,
                   r.summary, r.raw_response, r.evaluated_at
            FROM relevance_records r
            JOIN items i ON i.id = r.item_id
            JOIN queries q ON q.id = r.query_id
            WHERE q.text = ? AND r.score >= ?
            ORDER BY r.score DESC, i.published_at DESC, r.id ASC
            LIMIT ?
            "#,
        )
        .bind(query_text)
        .bind(i64::from(min_score))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let item = self.row_to_item(row)?;
                let score: i64 = row.try_get("score")?;
                let label: String = row.try_get("label")?;
                let record = RelevanceRecord {
                    item_identity: item.identity.clone(),
                    source_name: item.source_name.clone(),
                    query_id: row.try_get("query_id")?,
                    score: score.clamp(0, 100) as u8,
                    label: RelevanceLabel::parse(&label),
                    explanation: row.try_get("explanation")?,
                    key_information: row.try_get("key_information")?,
                    summary: row.try_get("summary")?,
                    raw_response: row.try_get("raw_response")?,
                    evaluated_at: self.codec.decode(row, "evaluated_at")?,
                };
                Ok((item, record))
            })
            .collect()
    }

    async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut tx = self.pool.begin().await?;

        let q = sqlx::query(
            "DELETE FROM relevance_records WHERE item_id IN (SELECT id FROM items WHERE fetched_at < ?)",
        );
        let records = self.codec.bind(q, cutoff).execute(&mut *tx).await?;

        let q = sqlx::query("DELETE FROM items WHERE fetched_at < ?");
        let items = self.codec.bind(q, cutoff).execute(&mut *tx).await?;

        tx.commit().await?;

        info!(
            days,
            items = items.rows_affected(),
            records = records.rows_affected(),
            "retention cleanup complete"
        );
        Ok(items.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM items) AS item_count,
                (SELECT COUNT(*) FROM relevance_records) AS record_count,
                (SELECT COUNT(*) FROM sources) AS source_count,
                (SELECT COUNT(*) FROM queries) AS query_count,
                (SELECT COUNT(*) FROM queries WHERE resolved = 0) AS open_query_count
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            item_count: row.try_get("item_count")?,
            record_count: row.try_get("record_count")?,
            source_count: row.try_get("source_count")?,
            query_count: row.try_get("query_count")?,
            open_query_count: row.try_get("open_query_count")?,
            size_bytes: (page_count.max(0) * page_size.max(0)) as u64,
        })
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query("SELECT name, url, last_consumed_at FROM sources ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SourceRecord {
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    last_consumed_at: self.codec.decode_opt(row, "last_consumed_at")?,
                })
            })
            .collect()
    }

    async fn source_breakdown(&self) -> Result<Vec<SourceBreakdown>> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.name, s.url, s.last_consumed_at,
                (SELECT COUNT(*) FROM items i WHERE i.source_name = s.name) AS item_count,
                COUNT(r.id) AS record_count,
                AVG(r.score) AS avg_score
            FROM sources s
            LEFT JOIN items i ON i.source_name = s.name
            LEFT JOIN relevance_records r ON r.item_id = i.id
            GROUP BY s.name, s.url, s.last_consumed_at
            ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SourceBreakdown {
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    last_consumed_at: self.codec.decode_opt(row, "last_consumed_at")?,
                    item_count: row.try_get("item_count")?,
                    record_count: row.try_get("record_count")?,
                    avg_score: row.try_get("avg_score")?,
                })
            })
            .collect()
    }

    async fn query_breakdown(&self) -> Result<Vec<QueryBreakdown>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.text, q.resolved, COUNT(r.id) AS record_count, AVG(r.score) AS avg_score
            FROM queries q
            LEFT JOIN relevance_records r ON r.query_id = q.id
            GROUP BY q.id, q.text, q.resolved
            ORDER BY q.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let resolved: i64 = row.try_get("resolved")?;
                Ok(QueryBreakdown {
                    id: row.try_get("id")?,
                    text: row.try_get("text")?,
                    resolved: resolved != 0,
                    record_count: row.try_get("record_count")?,
                    avg_score: row.try_get("avg_score")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl QueryLedger for SqliteStore {
    async fn add_query(&self, text: &str) -> Result<Query> {
        let text = text.trim();
        anyhow::ensure!(!text.is_empty(), "query text must not be empty");

        let q = sqlx::query(
            "INSERT INTO queries (text, resolved, created_at) VALUES (?, 0, ?)
             ON CONFLICT(text) DO NOTHING",
        )
        .bind(text);
        self.codec.bind(q, Utc::now()).execute(&self.pool).await?;

        self.query_by_text(text)
            .await?
            .ok_or_else(|| anyhow::anyhow!("query '{}' vanished after insert", text))
    }

    async fn list_open(&self) -> Result<Vec<Query>> {
        let rows = sqlx::query(
            "SELECT id, text, resolved, resolved_by_identity, resolved_by_source, resolved_at, created_at
             FROM queries WHERE resolved = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| self.row_to_query(r)).collect()
    }

    async fn list_queries(&self) -> Result<Vec<Query>> {
        let rows = sqlx::query(
            "SELECT id, text, resolved, resolved_by_identity, resolved_by_source, resolved_at, created_at
             FROM queries ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| self.row_to_query(r)).collect()
    }

    async fn resolve(&self, query_id: i64, item: &Item) -> Result<bool> {
        let q = sqlx::query(
            r#"
            UPDATE queries
            SET resolved = 1, resolved_by_identity = ?, resolved_by_source = ?, resolved_at = ?
            WHERE id = ? AND resolved = 0
            "#,
        )
        .bind(&item.identity)
        .bind(&item.source_name);
        let result = self
            .codec
            .bind(q, Utc::now())
            .bind(query_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to resolve query {}", query_id))?;
        Ok(result.rows_affected() == 1)
    }
}
