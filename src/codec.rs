//! Timestamp serialization strategy for the SQLite store.
//!
//! The codec is chosen by configuration and handed to
//! [`SqliteStore`](crate::store::sqlite::SqliteStore) at construction.
//! Both encodings order correctly under SQL comparison: unix seconds as
//! integers, RFC 3339 as fixed-width UTC text.

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampCodec {
    /// Integer seconds since the Unix epoch.
    #[default]
    #[serde(alias = "unix")]
    UnixSeconds,
    /// `2024-05-01T12:00:00.000000Z`
    Rfc3339,
}

impl TimestampCodec {
    /// Bind `ts` to the next placeholder of `query`.
    pub fn bind<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        ts: DateTime<Utc>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            TimestampCodec::UnixSeconds => query.bind(ts.timestamp()),
            TimestampCodec::Rfc3339 => query.bind(self.encode_text(ts)),
        }
    }

    /// Bind an optional timestamp, writing SQL `NULL` for `None`.
    pub fn bind_opt<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        ts: Option<DateTime<Utc>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match (self, ts) {
            (_, Some(ts)) => self.bind(query, ts),
            (TimestampCodec::UnixSeconds, None) => query.bind(None::<i64>),
            (TimestampCodec::Rfc3339, None) => query.bind(None::<String>),
        }
    }

    pub fn encode_text(&self, ts: DateTime<Utc>) -> String {
        match self {
            TimestampCodec::UnixSeconds => ts.timestamp().to_string(),
            TimestampCodec::Rfc3339 => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    /// Read the timestamp stored in column `col`.
    pub fn decode(&self, row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
        self.decode_opt(row, col)?
            .ok_or_else(|| anyhow!("column {} is NULL", col))
    }

    pub fn decode_opt(&self, row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
        match self {
            TimestampCodec::UnixSeconds => {
                let secs: Option<i64> = row.try_get(col)?;
                secs.map(|s| {
                    DateTime::from_timestamp(s, 0)
                        .ok_or_else(|| anyhow!("timestamp {} out of range in {}", s, col))
                })
                .transpose()
            }
            TimestampCodec::Rfc3339 => {
                let text: Option<String> = row.try_get(col)?;
                text.map(|t| self.decode_text(&t)).transpose()
            }
        }
    }

    pub fn decode_text(&self, text: &str) -> Result<DateTime<Utc>> {
        match self {
            TimestampCodec::UnixSeconds => {
                let secs: i64 = text.parse()?;
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| anyhow!("timestamp {} out of range", secs))
            }
            TimestampCodec::Rfc3339 => {
                Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
            }
        }
    }
}
